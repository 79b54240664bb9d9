//! Run results: the validation report, the emit summary, and the outcome
//! that wraps them.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use gps2shp_shared::Gps2ShpError;

/// Flat, serializable view of one error.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl From<&Gps2ShpError> for ReportEntry {
    fn from(err: &Gps2ShpError) -> Self {
        Self {
            kind: err.kind(),
            path: err.path().map(|p| p.to_path_buf()),
            line: err.line(),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Every validation-phase error found across a batch.
#[derive(Debug)]
pub struct ValidationReport {
    pub files_checked: usize,
    pub errors: Vec<Gps2ShpError>,
    pub generated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn new(files_checked: usize, errors: Vec<Gps2ShpError>) -> Self {
        Self {
            files_checked,
            errors,
            generated_at: Utc::now(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of distinct files that have at least one error.
    pub fn files_with_errors(&self) -> usize {
        let mut paths: Vec<_> = self.errors.iter().filter_map(|e| e.path()).collect();
        paths.sort();
        paths.dedup();
        paths.len()
    }

    pub fn entries(&self) -> Vec<ReportEntry> {
        self.errors.iter().map(ReportEntry::from).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_clean() { "valid" } else { "invalid" },
            "generated_at": self.generated_at,
            "files_checked": self.files_checked,
            "error_count": self.errors.len(),
            "errors": self.entries(),
        })
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "{} file(s) checked, no problems found", self.files_checked);
        }
        writeln!(
            f,
            "validation failed: {} error(s) in {} of {} file(s), nothing was written",
            self.errors.len(),
            self.files_with_errors(),
            self.files_checked,
        )?;
        for err in &self.errors {
            writeln!(f, "  [{}] {err}", err.kind())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Emit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Kml,
    Shapefile,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Kml => "KML",
            Self::Shapefile => "shapefile",
        })
    }
}

/// One output that was written successfully.
#[derive(Debug, Clone, Serialize)]
pub struct WrittenOutput {
    pub input: PathBuf,
    pub kind: OutputKind,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Checksum of the document, for KML output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Sidecar files (`.shx`, `.dbf`, `.prj`) for shapefile output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub companions: Vec<PathBuf>,
}

/// One output that was attempted and failed.
#[derive(Debug)]
pub struct EmitFailure {
    pub input: PathBuf,
    pub output: PathBuf,
    pub error: Gps2ShpError,
}

/// Per-output results of the emit pass.
#[derive(Debug, Default)]
pub struct EmitSummary {
    pub written: Vec<WrittenOutput>,
    pub failures: Vec<EmitFailure>,
    /// Outputs never attempted (fail-fast, or an earlier KML failure).
    pub skipped: Vec<PathBuf>,
}

impl EmitSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let failures: Vec<_> = self
            .failures
            .iter()
            .map(|f| {
                serde_json::json!({
                    "input": f.input,
                    "output": f.output,
                    "error": ReportEntry::from(&f.error),
                })
            })
            .collect();
        serde_json::json!({
            "written": self.written,
            "failures": failures,
            "skipped": self.skipped,
        })
    }
}

impl fmt::Display for EmitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for out in &self.written {
            write!(f, "wrote {} {} ({} bytes", out.kind, out.path.display(), out.size_bytes)?;
            if let Some(sha) = &out.sha256 {
                write!(f, ", sha256 {}", &sha[..sha.len().min(12)])?;
            }
            if !out.companions.is_empty() {
                write!(f, ", +{} sidecar file(s)", out.companions.len())?;
            }
            writeln!(f, ")")?;
        }
        for failure in &self.failures {
            writeln!(f, "FAILED {}: {}", failure.output.display(), failure.error)?;
        }
        for path in &self.skipped {
            writeln!(f, "skipped {}", path.display())?;
        }
        write!(
            f,
            "{} written, {} failed, {} skipped",
            self.written.len(),
            self.failures.len(),
            self.skipped.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one pipeline run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Validation found problems; nothing was written.
    Aborted(ValidationReport),
    /// Emit ran; individual outputs may still have failed.
    Completed(EmitSummary),
}

impl RunOutcome {
    /// 0 when every requested output was written, 1 when validation
    /// aborted the run, 2 when any output failed or was skipped.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Aborted(_) => 1,
            Self::Completed(summary) if summary.is_complete() => 0,
            Self::Completed(_) => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (status, body) = match self {
            Self::Aborted(report) => ("aborted", report.to_json()),
            Self::Completed(summary) => ("completed", summary.to_json()),
        };
        serde_json::json!({
            "status": status,
            "exit_code": self.exit_code(),
            "generated_at": Utc::now(),
            "result": body,
        })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted(report) => write!(f, "{report}"),
            Self::Completed(summary) => write!(f, "{summary}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gps2shp_shared::{Field, FieldReason};

    fn field_error(path: &str, line: usize) -> Gps2ShpError {
        Gps2ShpError::FieldValidation {
            path: path.into(),
            line: Some(line),
            field: Field::Latitude,
            reason: FieldReason::OutOfRange,
        }
    }

    #[test]
    fn report_counts_files_with_errors() {
        let report = ValidationReport::new(
            3,
            vec![
                field_error("a.csv", 2),
                field_error("a.csv", 9),
                field_error("b.csv", 4),
            ],
        );
        assert!(!report.is_clean());
        assert_eq!(report.files_with_errors(), 2);

        let text = report.to_string();
        assert!(text.starts_with("validation failed: 3 error(s) in 2 of 3 file(s)"));
        assert!(text.contains("[FieldValidationError] a.csv:9: latitude: outside valid range"));
    }

    #[test]
    fn report_json_has_structured_entries() {
        let report = ValidationReport::new(1, vec![field_error("a.csv", 2)]);
        let json = report.to_json();
        assert_eq!(json["status"], "invalid");
        assert_eq!(json["error_count"], 1);
        assert_eq!(json["errors"][0]["kind"], "FieldValidationError");
        assert_eq!(json["errors"][0]["path"], "a.csv");
        assert_eq!(json["errors"][0]["line"], 2);
    }

    #[test]
    fn exit_codes() {
        let aborted = RunOutcome::Aborted(ValidationReport::new(1, vec![field_error("a.csv", 1)]));
        assert_eq!(aborted.exit_code(), 1);

        let ok = RunOutcome::Completed(EmitSummary::default());
        assert_eq!(ok.exit_code(), 0);
        assert!(ok.is_success());

        let failed = RunOutcome::Completed(EmitSummary {
            failures: vec![EmitFailure {
                input: "a.csv".into(),
                output: "a.shp".into(),
                error: Gps2ShpError::ExternalTool {
                    tool: "ogr2ogr".into(),
                    exit_code: Some(1),
                    stderr: "ERROR 1: boom".into(),
                },
            }],
            ..Default::default()
        });
        assert_eq!(failed.exit_code(), 2);
        assert_eq!(failed.to_json()["result"]["failures"][0]["error"]["kind"], "ExternalToolError");

        let skipped = RunOutcome::Completed(EmitSummary {
            skipped: vec!["b.kml".into()],
            ..Default::default()
        });
        assert_eq!(skipped.exit_code(), 2);
    }

    #[test]
    fn summary_text_lists_every_output() {
        let summary = EmitSummary {
            written: vec![WrittenOutput {
                input: "a.csv".into(),
                kind: OutputKind::Kml,
                path: "a.kml".into(),
                size_bytes: 512,
                sha256: Some("0123456789abcdef0123".into()),
                companions: Vec::new(),
            }],
            failures: Vec::new(),
            skipped: vec!["b.kml".into()],
        };
        let text = summary.to_string();
        assert!(text.contains("wrote KML a.kml (512 bytes, sha256 0123456789ab)"));
        assert!(text.contains("skipped b.kml"));
        assert!(text.ends_with("1 written, 0 failed, 1 skipped"));
    }
}
