//! End-to-end conversion pipeline: validate everything, then emit.
//!
//! A run is two passes. The validation pass parses every input and checks
//! every destination, collecting all problems into a [`ValidationReport`].
//! Only a clean batch reaches the emit pass, so a rejected run never
//! touches the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use gps2shp_kml::{KmlOptions, TempDocument, render_document, write_document};
use gps2shp_ogr::{ShapefileBridge, ToolRunner};
use gps2shp_records::{ParseOptions, check_destination, load_input};
use gps2shp_shared::{ConversionConfig, Gps2ShpError, Result};

use crate::jobs::{ConversionJob, Destinations, find_collisions};
use crate::report::{
    EmitFailure, EmitSummary, OutputKind, RunOutcome, ValidationReport, WrittenOutput,
};

/// Lifecycle of a [`Pipeline`]. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Validating,
    Aborted,
    Emitting,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Aborted => "aborted",
            Self::Emitting => "emitting",
            Self::Done => "done",
        })
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each input file is parsed and validated.
    fn file_checked(&self, path: &Path, errors: usize, current: usize, total: usize);
    /// Called when an output file has been written.
    fn output_written(&self, path: &Path);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn file_checked(&self, _path: &Path, _errors: usize, _current: usize, _total: usize) {}
    fn output_written(&self, _path: &Path) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

/// One conversion run over a batch of input files.
pub struct Pipeline {
    config: ConversionConfig,
    runner: Box<dyn ToolRunner>,
    state: RunState,
}

impl Pipeline {
    pub fn new(config: ConversionConfig, runner: Box<dyn ToolRunner>) -> Self {
        Self {
            config,
            runner,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Validate `inputs` and, if the whole batch is clean, convert it.
    ///
    /// Returns `Err` only for problems that are not part of the run's
    /// result: an invalid configuration or a second call on the same
    /// pipeline.
    #[instrument(skip_all, fields(inputs = inputs.len(), format = self.config.format.describe()))]
    pub fn run(
        &mut self,
        inputs: &[PathBuf],
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        if self.state != RunState::Idle {
            return Err(Gps2ShpError::InvalidState {
                state: self.state.to_string(),
            });
        }
        self.config.validate()?;

        let start = Instant::now();
        self.state = RunState::Validating;
        progress.phase("Validating inputs");

        let outcome = match validate_batch(&self.config, self.runner.as_ref(), inputs, progress) {
            Err(report) => {
                self.state = RunState::Aborted;
                warn!(errors = report.errors.len(), "validation failed, nothing written");
                RunOutcome::Aborted(report)
            }
            Ok(jobs) => {
                self.state = RunState::Emitting;
                progress.phase("Writing outputs");
                let summary = emit_all(&self.config, self.runner.as_ref(), jobs, progress);
                self.state = RunState::Done;
                RunOutcome::Completed(summary)
            }
        };

        info!(
            exit_code = outcome.exit_code(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run finished"
        );
        progress.done(&outcome);
        Ok(outcome)
    }
}

/// Validation only. Never writes anything.
pub fn check(
    config: &ConversionConfig,
    runner: &dyn ToolRunner,
    inputs: &[PathBuf],
    progress: &dyn ProgressReporter,
) -> Result<ValidationReport> {
    config.validate()?;
    progress.phase("Validating inputs");
    Ok(match validate_batch(config, runner, inputs, progress) {
        Ok(jobs) => ValidationReport::new(jobs.len(), Vec::new()),
        Err(report) => report,
    })
}

/// Parse every input and check every destination, collecting all errors.
///
/// When shapefile output is requested the external tool is probed here
/// too, so a missing tool stops the run before any KML exists.
#[instrument(skip_all, fields(inputs = inputs.len()))]
pub fn validate_batch(
    config: &ConversionConfig,
    runner: &dyn ToolRunner,
    inputs: &[PathBuf],
    progress: &dyn ProgressReporter,
) -> std::result::Result<Vec<ConversionJob>, ValidationReport> {
    let opts = ParseOptions {
        delimiter: config.delimiter,
        skip_rows: config.skip_rows,
        layout: config.layout,
    };
    let total = inputs.len();
    let mut errors = Vec::new();
    let mut planned = Vec::with_capacity(total);

    for (i, path) in inputs.iter().enumerate() {
        let mut input = load_input(path, &opts, config.geometry);
        let destinations = Destinations::resolve(path, config.format, config.out_dir.as_deref());

        for dest in destinations.all_files() {
            if let Err(e) = check_destination(&dest, config.overwrite) {
                input.errors.push(e);
            }
        }

        progress.file_checked(path, input.errors.len(), i + 1, total);
        debug!(
            path = %path.display(),
            points = input.points.len(),
            errors = input.errors.len(),
            "input checked"
        );

        errors.append(&mut input.errors);
        planned.push(ConversionJob { input, destinations });
    }

    errors.extend(find_collisions(
        inputs,
        planned
            .iter()
            .map(|job| (job.input.source_path.as_path(), &job.destinations)),
    ));

    if config.format.wants_shapefile() {
        let bridge = ShapefileBridge::new(runner, config.tool_path.clone());
        if let Err(e) = bridge.probe() {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        info!(files = total, "validation passed");
        Ok(planned)
    } else {
        Err(ValidationReport::new(total, errors))
    }
}

/// Write every job's outputs. Failures are recorded, not returned.
#[instrument(skip_all, fields(jobs = jobs.len()))]
fn emit_all(
    config: &ConversionConfig,
    runner: &dyn ToolRunner,
    jobs: Vec<ConversionJob>,
    progress: &dyn ProgressReporter,
) -> EmitSummary {
    let bridge = ShapefileBridge::new(runner, config.tool_path.clone());
    let kml_opts = KmlOptions {
        geometry: config.geometry,
        style: config.style.clone(),
    };
    let mut summary = EmitSummary::default();
    let mut halted = false;

    for job in jobs {
        if halted {
            summary.skipped.extend(job.destinations.outputs().cloned());
            continue;
        }
        let failures_before = summary.failures.len();
        emit_job(&job, &bridge, &kml_opts, &mut summary, progress);

        if config.fail_fast && summary.failures.len() > failures_before {
            warn!(input = %job.input.source_path.display(), "fail-fast: skipping remaining files");
            halted = true;
        }
    }

    summary
}

fn emit_job(
    job: &ConversionJob,
    bridge: &ShapefileBridge<'_>,
    kml_opts: &KmlOptions,
    summary: &mut EmitSummary,
    progress: &dyn ProgressReporter,
) {
    let input = &job.input.source_path;
    let document = render_document(&job.input.name(), &job.input.points, kml_opts);

    // Holds the intermediate KML for shapefile-only runs until this job ends.
    let mut temp_kml: Option<TempDocument> = None;

    let kml_path = match &job.destinations.markup {
        Some(path) => match write_document(path, &document) {
            Ok(written) => {
                progress.output_written(path);
                summary.written.push(WrittenOutput {
                    input: input.clone(),
                    kind: OutputKind::Kml,
                    path: written.path,
                    size_bytes: written.size_bytes as u64,
                    sha256: Some(written.sha256),
                    companions: Vec::new(),
                });
                path.clone()
            }
            Err(e) => {
                record_failure(summary, input, path, e);
                summary.skipped.extend(job.destinations.shapefile.iter().cloned());
                return;
            }
        },
        None => {
            let Some(shp) = &job.destinations.shapefile else {
                return;
            };
            match TempDocument::create(&document) {
                Ok(temp) => temp_kml.insert(temp).path().to_path_buf(),
                Err(e) => {
                    record_failure(summary, input, shp, e);
                    return;
                }
            }
        }
    };

    let Some(shp) = &job.destinations.shapefile else {
        return;
    };
    match bridge.convert(&kml_path, shp) {
        Ok(output) => {
            progress.output_written(shp);
            let size_bytes = std::fs::metadata(shp).map(|m| m.len()).unwrap_or(0);
            summary.written.push(WrittenOutput {
                input: input.clone(),
                kind: OutputKind::Shapefile,
                path: shp.clone(),
                size_bytes,
                sha256: None,
                companions: output.files.into_iter().filter(|p| p != shp).collect(),
            });
        }
        Err(e) => record_failure(summary, input, shp, e),
    }
}

fn record_failure(summary: &mut EmitSummary, input: &Path, output: &Path, error: Gps2ShpError) {
    warn!(output = %output.display(), error = %error, "output failed");
    summary.failures.push(EmitFailure {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        error,
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
