//! Shared types, error model, and configuration for gps2shp.
//!
//! This crate is the foundation depended on by all other gps2shp crates.
//! It provides:
//! - [`Gps2ShpError`]: the unified error type
//! - Domain types ([`CoordinatePoint`], [`Field`], [`RecordLayout`], [`OutputFormat`])
//! - Configuration ([`AppConfig`], [`ConversionConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConversionConfig, DEFAULT_TOOL, InputConfig, OutputConfig, StyleConfig, ToolConfig,
    config_dir, config_file_path, init_config, init_config_at, load_config,
    load_config_from,
};
pub use error::{FieldReason, Gps2ShpError, Result};
pub use types::{CoordinatePoint, Field, GeometryKind, OutputFormat, RecordLayout};
