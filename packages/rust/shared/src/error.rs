//! Error types for gps2shp.
//!
//! Library crates use [`Gps2ShpError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::Field;

/// Top-level error type for all gps2shp operations.
///
/// The first four variants belong to the validation phase and are collected
/// into a report rather than returned early. `Write`, `ExternalTool` and
/// `ExternalToolTimeout` belong to the emit phase.
#[derive(Debug, thiserror::Error)]
pub enum Gps2ShpError {
    /// The input file could not be opened or read.
    #[error("cannot read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A row has the wrong number of fields for the configured layout.
    #[error("{}:{line}: expected {expected} fields, found {found}", .path.display())]
    MalformedRow {
        path: PathBuf,
        line: usize,
        expected: String,
        found: usize,
    },

    /// A field is not numeric, out of range, or missing.
    #[error("{}{}: {field}: {reason}", .path.display(), line_suffix(.line))]
    FieldValidation {
        path: PathBuf,
        /// `None` for file-level problems (no records, too few points).
        line: Option<usize>,
        field: Field,
        reason: FieldReason,
    },

    /// A requested output path cannot be written.
    #[error("destination {} is not writable: {reason}", .path.display())]
    DestinationUnwritable { path: PathBuf, reason: String },

    /// Writing an output file failed after validation passed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The external conversion tool failed or could not be started.
    #[error("{tool} failed{}: {}", exit_suffix(.exit_code), .stderr.trim())]
    ExternalTool {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The external conversion tool ran past its deadline and was killed.
    #[error("{tool} did not finish within {}s and was killed", .timeout.as_secs())]
    ExternalToolTimeout { tool: String, timeout: Duration },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A pipeline was asked to run again after it finished.
    #[error("pipeline already ran (state: {state}); start a new run")]
    InvalidState { state: String },
}

/// Why a field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldReason {
    /// Text is not a plain decimal number.
    NotNumeric,
    /// Latitude or longitude outside its valid range.
    OutOfRange,
    /// The label column is empty.
    MissingLabel,
    /// The label holds a character XML 1.0 cannot carry, even escaped.
    InvalidCharacter,
    /// The file holds no coordinate records at all.
    NoRecords,
    /// A polygon needs at least three points.
    TooFewPoints,
}

impl std::fmt::Display for FieldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotNumeric => "not a decimal number",
            Self::OutOfRange => "outside valid range",
            Self::MissingLabel => "label is missing",
            Self::InvalidCharacter => "label contains a character not allowed in XML",
            Self::NoRecords => "file contains no coordinate records",
            Self::TooFewPoints => "a polygon needs at least 3 points",
        };
        f.write_str(text)
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(":{l}")).unwrap_or_default()
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => String::new(),
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Gps2ShpError>;

impl Gps2ShpError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a destination error from any displayable reason.
    pub fn unwritable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DestinationUnwritable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a read failure with the input path.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Wrap a write failure with the output path.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Taxonomy name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileRead { .. } => "FileReadError",
            Self::MalformedRow { .. } => "MalformedRowError",
            Self::FieldValidation { .. } => "FieldValidationError",
            Self::DestinationUnwritable { .. } => "DestinationUnwritableError",
            Self::Write { .. } => "WriteError",
            Self::ExternalTool { .. } => "ExternalToolError",
            Self::ExternalToolTimeout { .. } => "ExternalToolTimeoutError",
            Self::Config { .. } => "ConfigError",
            Self::InvalidState { .. } => "InvalidStateError",
        }
    }

    /// File the error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::FileRead { path, .. }
            | Self::MalformedRow { path, .. }
            | Self::FieldValidation { path, .. }
            | Self::DestinationUnwritable { path, .. }
            | Self::Write { path, .. } => Some(path),
            _ => None,
        }
    }

    /// 1-based line number, for row-level errors.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedRow { line, .. } => Some(*line),
            Self::FieldValidation { line, .. } => *line,
            _ => None,
        }
    }

    /// True for errors raised before any output is written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::FileRead { .. }
                | Self::MalformedRow { .. }
                | Self::FieldValidation { .. }
                | Self::DestinationUnwritable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = Gps2ShpError::config("unknown layout");
        assert_eq!(err.to_string(), "config error: unknown layout");

        let err = Gps2ShpError::FieldValidation {
            path: "track.csv".into(),
            line: Some(7),
            field: Field::Latitude,
            reason: FieldReason::OutOfRange,
        };
        assert_eq!(
            err.to_string(),
            "track.csv:7: latitude: outside valid range"
        );
    }

    #[test]
    fn file_level_field_error_has_no_line() {
        let err = Gps2ShpError::FieldValidation {
            path: "empty.csv".into(),
            line: None,
            field: Field::Record,
            reason: FieldReason::NoRecords,
        };
        assert_eq!(err.line(), None);
        assert!(err.to_string().starts_with("empty.csv: record:"));
    }

    #[test]
    fn external_tool_error_carries_stderr() {
        let err = Gps2ShpError::ExternalTool {
            tool: "ogr2ogr".into(),
            exit_code: Some(1),
            stderr: "ERROR 1: Unable to open datasource\n".into(),
        };
        assert_eq!(err.kind(), "ExternalToolError");
        assert!(err.to_string().contains("exit code 1"));
        assert!(err.to_string().contains("Unable to open datasource"));
        assert!(!err.is_validation());
    }

    #[test]
    fn kinds_match_taxonomy() {
        let err = Gps2ShpError::MalformedRow {
            path: "a.csv".into(),
            line: 3,
            expected: "3 or 4".into(),
            found: 2,
        };
        assert_eq!(err.kind(), "MalformedRowError");
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.path(), Some(Path::new("a.csv")));
        assert!(err.is_validation());
    }
}
