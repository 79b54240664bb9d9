//! KML document rendering and atomic output.
//!
//! Renders validated points as a KML 2.2 document, either one `<Placemark>`
//! per point or a single closed `<Polygon>`, and writes it to disk through
//! a temp file + rename so a destination never holds a partial document.

mod escape;

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use gps2shp_shared::{CoordinatePoint, GeometryKind, Gps2ShpError, Result, StyleConfig};

use crate::escape::escape_xml;

/// KML namespace for the generated documents.
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

const POLY_STYLE_ID: &str = "gps2shp-poly";

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Rendering options.
#[derive(Debug, Clone, Default)]
pub struct KmlOptions {
    pub geometry: GeometryKind,
    pub style: StyleConfig,
}

/// Render a complete KML document named `name`.
pub fn render_document(name: &str, points: &[CoordinatePoint], opts: &KmlOptions) -> String {
    let name = escape_xml(name);
    let mut out = String::with_capacity(256 + points.len() * 160);

    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<kml xmlns=\"{KML_NAMESPACE}\">");
    out.push_str("  <Document>\n");
    let _ = writeln!(out, "    <name>{name}</name>");

    match opts.geometry {
        GeometryKind::Points => {
            for point in points {
                render_placemark(&mut out, point);
            }
        }
        GeometryKind::Polygon => {
            render_style(&mut out, &opts.style);
            render_polygon(&mut out, &name, points);
        }
    }

    out.push_str("  </Document>\n");
    out.push_str("</kml>\n");
    out
}

fn render_placemark(out: &mut String, point: &CoordinatePoint) {
    out.push_str("    <Placemark>\n");
    let _ = writeln!(out, "      <name>{}</name>", escape_xml(point.label()));
    out.push_str("      <Point>\n");
    if point.elevation().is_some() {
        out.push_str("        <altitudeMode>absolute</altitudeMode>\n");
    }
    let _ = writeln!(out, "        <coordinates>{}</coordinates>", coordinate(point));
    out.push_str("      </Point>\n");
    out.push_str("    </Placemark>\n");
}

fn render_style(out: &mut String, style: &StyleConfig) {
    let _ = writeln!(out, "    <Style id=\"{POLY_STYLE_ID}\">");
    out.push_str("      <LineStyle>\n");
    let _ = writeln!(out, "        <color>{}</color>", escape_xml(&style.line_color));
    let _ = writeln!(out, "        <width>{}</width>", style.line_width);
    out.push_str("      </LineStyle>\n");
    out.push_str("      <PolyStyle>\n");
    let _ = writeln!(out, "        <color>{}</color>", escape_xml(&style.poly_color));
    let _ = writeln!(out, "        <fill>{}</fill>", u8::from(style.fill));
    let _ = writeln!(out, "        <outline>{}</outline>", u8::from(style.outline));
    out.push_str("      </PolyStyle>\n");
    out.push_str("    </Style>\n");
}

fn render_polygon(out: &mut String, name: &str, points: &[CoordinatePoint]) {
    out.push_str("    <Folder>\n");
    let _ = writeln!(out, "      <name>{name}</name>");
    out.push_str("      <Placemark>\n");
    let _ = writeln!(out, "        <name>{name}</name>");
    let _ = writeln!(out, "        <styleUrl>#{POLY_STYLE_ID}</styleUrl>");
    out.push_str("        <Polygon>\n");
    out.push_str("          <outerBoundaryIs>\n");
    out.push_str("            <LinearRing>\n");
    out.push_str("              <tessellate>1</tessellate>\n");
    out.push_str("              <coordinates>\n");
    for point in closed_ring(points) {
        let _ = writeln!(out, "                {}", coordinate(point));
    }
    out.push_str("              </coordinates>\n");
    out.push_str("            </LinearRing>\n");
    out.push_str("          </outerBoundaryIs>\n");
    out.push_str("        </Polygon>\n");
    out.push_str("      </Placemark>\n");
    out.push_str("    </Folder>\n");
}

/// Ring vertices with the first point repeated at the end unless already closed.
fn closed_ring(points: &[CoordinatePoint]) -> impl Iterator<Item = &CoordinatePoint> {
    let closing = match (points.first(), points.last()) {
        (Some(first), Some(last))
            if points.len() > 1
                && (first.latitude() != last.latitude()
                    || first.longitude() != last.longitude()) =>
        {
            Some(first)
        }
        _ => None,
    };
    points.iter().chain(closing)
}

/// `lon,lat[,ele]` tuple. `{}` on f64 is the shortest round-trippable form.
fn coordinate(point: &CoordinatePoint) -> String {
    match point.elevation() {
        Some(ele) => format!("{},{},{}", point.longitude(), point.latitude(), ele),
        None => format!("{},{}", point.longitude(), point.latitude()),
    }
}

// ---------------------------------------------------------------------------
// Atomic output
// ---------------------------------------------------------------------------

/// Metadata for a file written by [`write_document`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Write `contents` to `path` atomically (write to temp, then rename).
///
/// The temp file lives next to the destination so the rename stays on one
/// filesystem. On any failure the temp file is removed and the destination
/// is left untouched.
#[instrument(skip(contents), fields(path = %path.display(), size = contents.len()))]
pub fn write_document(path: &Path, contents: &str) -> Result<WrittenFile> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.kml".to_string());
    let temp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

    if let Err(e) = write_synced(&temp, contents.as_bytes()) {
        let _ = std::fs::remove_file(&temp);
        return Err(Gps2ShpError::write(path, e));
    }

    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(Gps2ShpError::write(path, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    debug!(sha256 = %sha256, "wrote KML document");

    Ok(WrittenFile {
        path: path.to_path_buf(),
        sha256,
        size_bytes: contents.len(),
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// A KML document in the system temp directory, removed on drop.
///
/// Used as the converter input when only shapefile output was requested.
#[derive(Debug)]
pub struct TempDocument {
    path: PathBuf,
}

impl TempDocument {
    /// Write `contents` to a fresh temp file.
    pub fn create(contents: &str) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("gps2shp-{}.kml", uuid::Uuid::now_v7()));
        write_synced(&path, contents.as_bytes()).map_err(|e| {
            let _ = std::fs::remove_file(&path);
            Gps2ShpError::write(&path, e)
        })?;
        debug!(path = %path.display(), "wrote temporary KML");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDocument {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "could not remove temporary KML");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gps2shp-kml-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_points() -> Vec<CoordinatePoint> {
        vec![
            CoordinatePoint::new("Trailhead", 46.5581, 7.8352, Some(1042.5)).unwrap(),
            CoordinatePoint::new("Fish & Chips <north>", -33.865143, 151.2099, None).unwrap(),
            CoordinatePoint::new("Pole", 90.0, -180.0, Some(-12.25)).unwrap(),
            CoordinatePoint::new("Tiny", 0.000_000_1, -0.000_000_9, None).unwrap(),
        ]
    }

    /// Parse placemarks back as (label, lon, lat, ele).
    fn read_back(kml: &str) -> Vec<(String, f64, f64, Option<f64>)> {
        let doc = roxmltree::Document::parse(kml).expect("well-formed KML");
        doc.descendants()
            .filter(|n| n.has_tag_name((KML_NAMESPACE, "Placemark")))
            .map(|pm| {
                let name = pm
                    .children()
                    .find(|n| n.has_tag_name((KML_NAMESPACE, "name")))
                    .and_then(|n| n.text())
                    .unwrap_or_default()
                    .to_string();
                let coords = pm
                    .descendants()
                    .find(|n| n.has_tag_name((KML_NAMESPACE, "coordinates")))
                    .and_then(|n| n.text())
                    .unwrap_or_default();
                let parts: Vec<f64> = coords
                    .trim()
                    .split(',')
                    .map(|p| p.parse().unwrap())
                    .collect();
                (name, parts[0], parts[1], parts.get(2).copied())
            })
            .collect()
    }

    #[test]
    fn points_round_trip_through_xml_parser() {
        let points = make_points();
        let kml = render_document("track", &points, &KmlOptions::default());
        let parsed = read_back(&kml);

        assert_eq!(parsed.len(), points.len());
        for (point, (label, lon, lat, ele)) in points.iter().zip(&parsed) {
            assert_eq!(label, point.label());
            assert!((lon - point.longitude()).abs() < 1e-6);
            assert!((lat - point.latitude()).abs() < 1e-6);
            match (ele, point.elevation()) {
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-6),
                (None, None) => {}
                other => panic!("elevation mismatch: {other:?}"),
            }
        }
    }

    #[test]
    fn document_name_and_escaping() {
        let points = make_points();
        let kml = render_document("a<b>&c", &points, &KmlOptions::default());
        assert!(kml.contains("<name>a&lt;b&gt;&amp;c</name>"));
        assert!(kml.contains("<name>Fish &amp; Chips &lt;north&gt;</name>"));
        assert!(kml.contains("<coordinates>7.8352,46.5581,1042.5</coordinates>"));
        assert!(kml.contains("<coordinates>151.2099,-33.865143</coordinates>"));
    }

    #[test]
    fn altitude_mode_only_with_elevation() {
        let kml = render_document(
            "t",
            &[CoordinatePoint::new("flat", 1.0, 2.0, None).unwrap()],
            &KmlOptions::default(),
        );
        assert!(!kml.contains("altitudeMode"));
    }

    #[test]
    fn polygon_ring_is_closed_and_styled() {
        let points = vec![
            CoordinatePoint::new("Point 1", 51.5072, -0.1276, None).unwrap(),
            CoordinatePoint::new("Point 2", 51.51, -0.12, None).unwrap(),
            CoordinatePoint::new("Point 3", 51.505, -0.115, None).unwrap(),
        ];
        let opts = KmlOptions {
            geometry: GeometryKind::Polygon,
            style: StyleConfig::default(),
        };
        let kml = render_document("field", &points, &opts);

        let doc = roxmltree::Document::parse(&kml).expect("well-formed KML");
        let placemarks = doc
            .descendants()
            .filter(|n| n.has_tag_name((KML_NAMESPACE, "Placemark")))
            .count();
        assert_eq!(placemarks, 1);

        let coords = doc
            .descendants()
            .find(|n| n.has_tag_name((KML_NAMESPACE, "coordinates")))
            .and_then(|n| n.text())
            .unwrap();
        let vertices: Vec<&str> = coords.split_whitespace().collect();
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices.first(), vertices.last());

        assert!(kml.contains("<color>ff0000ff</color>"));
        assert!(kml.contains("<width>1.5</width>"));
        assert!(kml.contains("<fill>1</fill>"));
        assert!(kml.contains("<styleUrl>#gps2shp-poly</styleUrl>"));
    }

    #[test]
    fn already_closed_ring_is_not_doubled() {
        let a = CoordinatePoint::new("a", 1.0, 1.0, None).unwrap();
        let b = CoordinatePoint::new("b", 2.0, 1.0, None).unwrap();
        let c = CoordinatePoint::new("c", 2.0, 2.0, None).unwrap();
        let points = vec![a.clone(), b, c, a];
        assert_eq!(closed_ring(&points).count(), 4);
    }

    #[test]
    fn write_document_is_atomic_and_reports_checksum() {
        let tmp = temp_dir();
        let target = tmp.join("track.kml");
        std::fs::write(&target, "stale").unwrap();

        let written = write_document(&target, "<kml/>\n").unwrap();
        assert_eq!(written.size_bytes, 7);
        assert_eq!(written.sha256.len(), 64);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "<kml/>\n");

        // No temp files should remain
        for entry in std::fs::read_dir(&tmp).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn write_document_into_missing_dir_fails_cleanly() {
        let tmp = temp_dir();
        let target = tmp.join("missing").join("track.kml");
        let err = write_document(&target, "<kml/>").unwrap_err();
        assert_eq!(err.kind(), "WriteError");
        assert!(!target.exists());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn temp_document_removed_on_drop() {
        let doc = TempDocument::create("<kml/>").unwrap();
        let path = doc.path().to_path_buf();
        assert!(path.exists());
        drop(doc);
        assert!(!path.exists());
    }
}
