//! Core domain types for gps2shp conversions.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CoordinatePoint
// ---------------------------------------------------------------------------

/// A validated, labeled WGS84 position.
///
/// Only constructed through [`CoordinatePoint::new`], which rejects
/// non-finite or out-of-range coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatePoint {
    label: String,
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
}

impl CoordinatePoint {
    /// Build a point, returning the offending field if a coordinate is invalid.
    pub fn new(
        label: impl Into<String>,
        latitude: f64,
        longitude: f64,
        elevation: Option<f64>,
    ) -> std::result::Result<Self, Field> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Field::Latitude);
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Field::Longitude);
        }
        if elevation.is_some_and(|e| !e.is_finite()) {
            return Err(Field::Elevation);
        }
        Ok(Self {
            label: label.into(),
            latitude,
            longitude,
            elevation,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn elevation(&self) -> Option<f64> {
        self.elevation
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// A column of an input record, used to tag validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Label,
    Latitude,
    Longitude,
    Elevation,
    /// The record (or file) as a whole.
    Record,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Label => "label",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::Elevation => "elevation",
            Self::Record => "record",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Layout / geometry / format selectors
// ---------------------------------------------------------------------------

/// Column layout of the input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordLayout {
    /// `label, latitude, longitude[, elevation]`
    #[default]
    Labeled,
    /// `longitude latitude[ elevation]`, labels synthesized as `Point <n>`.
    LonLat,
}

impl RecordLayout {
    /// Inclusive range of accepted field counts.
    pub fn field_counts(&self) -> (usize, usize) {
        match self {
            Self::Labeled => (3, 4),
            Self::LonLat => (2, 3),
        }
    }

    /// Human-readable field count expectation for error messages.
    pub fn expected_fields(&self) -> String {
        let (min, max) = self.field_counts();
        format!("{min} or {max}")
    }
}

/// How points are rendered in the KML document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeometryKind {
    /// One placemark per point.
    #[default]
    Points,
    /// A single closed polygon through every point, in order.
    Polygon,
}

/// Which outputs a run should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Kml,
    Shp,
    #[default]
    Both,
}

impl OutputFormat {
    pub fn wants_markup(&self) -> bool {
        matches!(self, Self::Kml | Self::Both)
    }

    pub fn wants_shapefile(&self) -> bool {
        matches!(self, Self::Shp | Self::Both)
    }

    /// Description used in log lines and progress output.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Kml => "KML files",
            Self::Shp => "ESRI Shapefiles",
            Self::Both => "KML files and ESRI Shapefiles",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_coordinates() {
        for lat in [-90.0, 0.0, 90.0] {
            assert!(CoordinatePoint::new("p", lat, 0.0, None).is_ok());
        }
        for lon in [-180.0, 180.0] {
            assert!(CoordinatePoint::new("p", 0.0, lon, None).is_ok());
        }
    }

    #[test]
    fn rejects_out_of_range_and_non_finite() {
        assert_eq!(
            CoordinatePoint::new("p", 90.0001, 0.0, None),
            Err(Field::Latitude)
        );
        assert_eq!(
            CoordinatePoint::new("p", -90.0001, 0.0, None),
            Err(Field::Latitude)
        );
        assert_eq!(
            CoordinatePoint::new("p", 0.0, 180.5, None),
            Err(Field::Longitude)
        );
        assert_eq!(
            CoordinatePoint::new("p", f64::NAN, 0.0, None),
            Err(Field::Latitude)
        );
        assert_eq!(
            CoordinatePoint::new("p", 0.0, 0.0, Some(f64::INFINITY)),
            Err(Field::Elevation)
        );
    }

    #[test]
    fn output_format_selection() {
        assert!(OutputFormat::Both.wants_markup());
        assert!(OutputFormat::Both.wants_shapefile());
        assert!(!OutputFormat::Kml.wants_shapefile());
        assert!(!OutputFormat::Shp.wants_markup());
    }

    #[test]
    fn layout_deserializes_kebab_case() {
        #[derive(Deserialize)]
        struct Wrap {
            layout: RecordLayout,
        }
        let w: Wrap = toml::from_str("layout = \"lon-lat\"").expect("parse");
        assert_eq!(w.layout, RecordLayout::LonLat);
        assert_eq!(RecordLayout::LonLat.field_counts(), (2, 3));
    }
}
