//! Field-level validation: raw records → [`CoordinatePoint`]s.

use std::path::Path;
use std::sync::LazyLock;

use gps2shp_shared::{
    CoordinatePoint, Field, FieldReason, GeometryKind, Gps2ShpError, RecordLayout,
};
use regex::Regex;

use crate::parser::RawRecord;

/// Plain decimal: optional sign, digits with at most one `.`.
/// Rejects `NaN`, `inf` and exponents, which `f64::from_str` would accept.
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)$").expect("decimal regex")
});

/// Validate every record, collecting all problems instead of stopping at the first.
pub fn validate_records(
    path: &Path,
    records: &[RawRecord],
    layout: RecordLayout,
) -> std::result::Result<Vec<CoordinatePoint>, Vec<Gps2ShpError>> {
    let mut points = Vec::with_capacity(records.len());
    let mut errors = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        match validate_record(path, record, layout, idx + 1) {
            Ok(point) => points.push(point),
            Err(mut row_errors) => errors.append(&mut row_errors),
        }
    }

    if errors.is_empty() {
        Ok(points)
    } else {
        Err(errors)
    }
}

/// File-level checks on an otherwise valid point list.
pub fn check_point_count(
    path: &Path,
    count: usize,
    geometry: GeometryKind,
) -> Option<Gps2ShpError> {
    let reason = match geometry {
        _ if count == 0 => FieldReason::NoRecords,
        GeometryKind::Polygon if count < 3 => FieldReason::TooFewPoints,
        _ => return None,
    };
    Some(Gps2ShpError::FieldValidation {
        path: path.to_path_buf(),
        line: None,
        field: Field::Record,
        reason,
    })
}

fn validate_record(
    path: &Path,
    record: &RawRecord,
    layout: RecordLayout,
    ordinal: usize,
) -> std::result::Result<CoordinatePoint, Vec<Gps2ShpError>> {
    let column = |i: usize| record.fields.get(i).map(String::as_str);
    let columns = match layout {
        RecordLayout::Labeled => column(0)
            .zip(column(1))
            .zip(column(2))
            .map(|((label, lat), lon)| (label.to_string(), lat, lon, column(3))),
        RecordLayout::LonLat => column(0)
            .zip(column(1))
            .map(|(lon, lat)| (format!("Point {ordinal}"), lat, lon, column(2))),
    };
    let Some((label, lat_text, lon_text, ele_text)) = columns else {
        return Err(vec![Gps2ShpError::MalformedRow {
            path: path.to_path_buf(),
            line: record.line,
            expected: layout.expected_fields(),
            found: record.fields.len(),
        }]);
    };

    let mut errors = Vec::new();
    let mut fail = |field: Field, reason: FieldReason| {
        errors.push(Gps2ShpError::FieldValidation {
            path: path.to_path_buf(),
            line: Some(record.line),
            field,
            reason,
        });
    };

    if label.is_empty() {
        fail(Field::Label, FieldReason::MissingLabel);
    } else if !label.chars().all(is_xml_char) {
        fail(Field::Label, FieldReason::InvalidCharacter);
    }

    let latitude = parse_decimal(lat_text);
    match latitude {
        None => fail(Field::Latitude, FieldReason::NotNumeric),
        Some(v) if !(-90.0..=90.0).contains(&v) => fail(Field::Latitude, FieldReason::OutOfRange),
        Some(_) => {}
    }

    let longitude = parse_decimal(lon_text);
    match longitude {
        None => fail(Field::Longitude, FieldReason::NotNumeric),
        Some(v) if !(-180.0..=180.0).contains(&v) => {
            fail(Field::Longitude, FieldReason::OutOfRange)
        }
        Some(_) => {}
    }

    // An empty trailing column means "no elevation".
    let elevation = match ele_text.filter(|t| !t.is_empty()) {
        None => None,
        Some(text) => {
            let value = parse_decimal(text);
            if value.is_none() {
                fail(Field::Elevation, FieldReason::NotNumeric);
            }
            value
        }
    };

    match (latitude, longitude) {
        (Some(lat), Some(lon)) if errors.is_empty() => {
            CoordinatePoint::new(label, lat, lon, elevation).map_err(|field| {
                vec![Gps2ShpError::FieldValidation {
                    path: path.to_path_buf(),
                    line: Some(record.line),
                    field,
                    reason: FieldReason::OutOfRange,
                }]
            })
        }
        _ => Err(errors),
    }
}

/// Characters allowed in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')
        || c >= '\u{10000}'
}

fn parse_decimal(text: &str) -> Option<f64> {
    if !DECIMAL_RE.is_match(text) {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}
