//! Conversion orchestration for gps2shp.
//!
//! Ties the record parser, the KML emitter and the shapefile bridge into
//! a two-pass run: validate the whole batch, then write it.

pub mod jobs;
pub mod pipeline;
pub mod report;

pub use jobs::{ConversionJob, Destinations};
pub use pipeline::{Pipeline, ProgressReporter, RunState, SilentProgress, check, validate_batch};
pub use report::{
    EmitFailure, EmitSummary, OutputKind, ReportEntry, RunOutcome, ValidationReport, WrittenOutput,
};
