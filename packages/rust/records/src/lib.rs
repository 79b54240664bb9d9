//! Input parsing and pre-flight validation.
//!
//! This crate provides:
//! - [`parser`]: splits delimited files into raw records
//! - [`fields`]: turns raw records into validated [`CoordinatePoint`]s
//! - [`destination`]: checks that output paths can be written
//! - [`load_input`]: parse + validate one file into an [`InputFile`]

pub mod destination;
pub mod fields;
pub mod parser;

use std::path::{Path, PathBuf};

use gps2shp_shared::{CoordinatePoint, GeometryKind, Gps2ShpError};
use tracing::{debug, instrument};

pub use destination::check_destination;
pub use fields::{check_point_count, validate_records};
pub use parser::{ParseOptions, ParsedFile, RawRecord, parse_file, parse_str};

/// A parsed and validated input file.
///
/// `points` is only meaningful when `errors` is empty.
#[derive(Debug)]
pub struct InputFile {
    pub source_path: PathBuf,
    pub points: Vec<CoordinatePoint>,
    pub errors: Vec<Gps2ShpError>,
}

impl InputFile {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// File stem, used to name outputs and the KML document.
    pub fn name(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gps".to_string())
    }
}

/// Parse and validate one file, collecting every problem found.
///
/// Never fails: a read error becomes the file's single error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_input(path: &Path, opts: &ParseOptions, geometry: GeometryKind) -> InputFile {
    let parsed = match parse_file(path, opts) {
        Ok(parsed) => parsed,
        Err(e) => {
            return InputFile {
                source_path: path.to_path_buf(),
                points: Vec::new(),
                errors: vec![e],
            };
        }
    };

    let mut errors = parsed.errors;
    let points = match validate_records(path, &parsed.records, opts.layout) {
        Ok(points) => points,
        Err(mut field_errors) => {
            errors.append(&mut field_errors);
            Vec::new()
        }
    };

    if errors.is_empty() {
        if let Some(e) = check_point_count(path, points.len(), geometry) {
            errors.push(e);
        }
    }

    // Report in file order regardless of which pass found the problem.
    errors.sort_by_key(|e| e.line().unwrap_or(usize::MAX));

    debug!(points = points.len(), errors = errors.len(), "input validated");

    InputFile {
        source_path: path.to_path_buf(),
        points,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures/csv").join(name)
    }

    #[test]
    fn load_valid_fixture() {
        let opts = ParseOptions {
            skip_rows: 1,
            ..ParseOptions::default()
        };
        let input = load_input(&fixture("waypoints.csv"), &opts, GeometryKind::Points);
        assert!(input.is_valid(), "errors: {:?}", input.errors);
        assert_eq!(input.points.len(), 4);
        assert_eq!(input.name(), "waypoints");
        assert_eq!(input.points[0].elevation(), Some(1042.5));
        assert_eq!(input.points[3].elevation(), None);
    }

    #[test]
    fn errors_are_ordered_by_line() {
        let input = load_input(
            &fixture("broken.csv"),
            &ParseOptions::default(),
            GeometryKind::Points,
        );
        assert!(!input.is_valid());
        let lines: Vec<Option<usize>> = input.errors.iter().map(|e| e.line()).collect();
        assert_eq!(lines, vec![Some(2), Some(3), Some(6)]);
        assert_eq!(input.errors[0].kind(), "FieldValidationError");
        assert_eq!(input.errors[1].kind(), "MalformedRowError");
    }

    #[test]
    fn polygon_fixture_in_lon_lat_layout() {
        let opts = ParseOptions {
            delimiter: ' ',
            skip_rows: 0,
            layout: gps2shp_shared::RecordLayout::LonLat,
        };
        let input = load_input(&fixture("field-boundary.txt"), &opts, GeometryKind::Polygon);
        assert!(input.is_valid(), "errors: {:?}", input.errors);
        assert_eq!(input.points.len(), 4);
        assert_eq!(input.points[0].label(), "Point 1");
    }

    #[test]
    fn empty_file_has_no_records() {
        let input = load_input(
            &fixture("header-only.csv"),
            &ParseOptions {
                skip_rows: 1,
                ..ParseOptions::default()
            },
            GeometryKind::Points,
        );
        assert_eq!(input.errors.len(), 1);
        assert!(input.errors[0].to_string().contains("no coordinate records"));
    }

    #[test]
    fn comment_lines_keep_physical_line_numbers() {
        let parsed = parse_file(&fixture("second-leg.csv"), &ParseOptions::default()).unwrap();
        assert!(parsed.errors.is_empty());
        let lines: Vec<usize> = parsed.records.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3]);

        let input = load_input(
            &fixture("second-leg.csv"),
            &ParseOptions::default(),
            GeometryKind::Points,
        );
        assert_eq!(input.points[1].label(), "Pass");
        assert_eq!(input.points[1].elevation(), Some(2650.0));
    }

    #[test]
    fn unreadable_file_is_single_error() {
        let input = load_input(
            &fixture("does-not-exist.csv"),
            &ParseOptions::default(),
            GeometryKind::Points,
        );
        assert_eq!(input.errors.len(), 1);
        assert_eq!(input.errors[0].kind(), "FileReadError");
    }
}
