//! Delimited GPS record parser.
//!
//! Splits an input file into raw field tuples:
//! - the first `skip_rows` physical lines are headers and ignored
//! - blank lines and `#` comment lines are skipped
//! - every other line is split on the delimiter and each field trimmed
//! - rows with a field count outside the layout's range are reported as
//!   [`Gps2ShpError::MalformedRow`] and parsing continues

use std::path::{Path, PathBuf};

use gps2shp_shared::{Gps2ShpError, RecordLayout, Result};
use tracing::debug;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Options controlling how a file is split into records.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Field delimiter. `' '` splits on any run of whitespace.
    pub delimiter: char,
    /// Leading physical lines to skip.
    pub skip_rows: usize,
    /// Expected column layout (decides the accepted field count).
    pub layout: RecordLayout,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            skip_rows: 0,
            layout: RecordLayout::Labeled,
        }
    }
}

/// One data row, before any semantic validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based physical line number.
    pub line: usize,
    pub fields: Vec<String>,
}

/// Result of parsing one file.
#[derive(Debug)]
pub struct ParsedFile {
    pub path: PathBuf,
    /// Rows with an acceptable field count, in file order.
    pub records: Vec<RawRecord>,
    /// Malformed rows.
    pub errors: Vec<Gps2ShpError>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Read and split a file. Fails only if the file cannot be read.
pub fn parse_file(path: &Path, opts: &ParseOptions) -> Result<ParsedFile> {
    let content =
        std::fs::read_to_string(path).map_err(|e| Gps2ShpError::file_read(path, e))?;
    Ok(parse_str(path, &content, opts))
}

/// Split already-loaded file content. `path` is only used to tag errors.
pub fn parse_str(path: &Path, content: &str, opts: &ParseOptions) -> ParsedFile {
    let (min_fields, max_fields) = opts.layout.field_counts();
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut records = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate().skip(opts.skip_rows) {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields = split_fields(trimmed, opts.delimiter);
        if fields.len() < min_fields || fields.len() > max_fields {
            errors.push(Gps2ShpError::MalformedRow {
                path: path.to_path_buf(),
                line: line_no,
                expected: opts.layout.expected_fields(),
                found: fields.len(),
            });
            continue;
        }

        records.push(RawRecord {
            line: line_no,
            fields,
        });
    }

    debug!(
        path = %path.display(),
        records = records.len(),
        malformed = errors.len(),
        "parsed input file"
    );

    ParsedFile {
        path: path.to_path_buf(),
        records,
        errors,
    }
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    if delimiter == ' ' {
        line.split_whitespace().map(str::to_string).collect()
    } else {
        line.split(delimiter)
            .map(|f| f.trim().to_string())
            .collect()
    }
}
