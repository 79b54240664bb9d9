//! Shapefile bridge to GDAL's `ogr2ogr`.
//!
//! Shapefile encoding is delegated to an external tool. The bridge builds
//! its command line, interprets the result, and makes sure a failed
//! conversion leaves no new shapefile-family files behind.

pub mod runner;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use gps2shp_shared::{Gps2ShpError, Result};

pub use runner::{ProcessRunner, ToolOutput, ToolRunner};

/// Extensions written by a shapefile conversion.
pub const SHAPEFILE_EXTENSIONS: [&str; 4] = ["shp", "shx", "dbf", "prj"];

/// Extensions that must exist after a successful conversion.
pub const SHAPEFILE_REQUIRED: [&str; 3] = ["shp", "shx", "dbf"];

/// Prefix of the first line `ogr2ogr --version` prints.
const VERSION_PREFIX: &str = "GDAL ";

/// Every member of the shapefile family sharing `shp_path`'s base name.
pub fn shapefile_family(shp_path: &Path) -> Vec<PathBuf> {
    SHAPEFILE_EXTENSIONS
        .iter()
        .map(|ext| shp_path.with_extension(ext))
        .collect()
}

/// Files produced by a successful conversion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ShapefileOutput {
    pub files: Vec<PathBuf>,
    /// `Warning ...` lines the tool printed.
    pub warnings: Vec<String>,
}

/// Drives the external tool through a [`ToolRunner`].
pub struct ShapefileBridge<'a> {
    runner: &'a dyn ToolRunner,
    tool: String,
}

impl<'a> ShapefileBridge<'a> {
    /// `tool` names the executable in error messages.
    pub fn new(runner: &'a dyn ToolRunner, tool: impl Into<String>) -> Self {
        Self {
            runner,
            tool: tool.into(),
        }
    }

    /// Confirm the tool runs and is GDAL. Returns its version line.
    pub fn probe(&self) -> Result<String> {
        let output = self.runner.run(&["--version".into()])?;
        let version = output.stdout.lines().next().unwrap_or_default().trim();

        if output.success() && version.starts_with(VERSION_PREFIX) {
            info!(tool = %self.tool, version, "conversion tool found");
            return Ok(version.to_string());
        }

        Err(Gps2ShpError::ExternalTool {
            tool: self.tool.clone(),
            exit_code: output.exit_code,
            stderr: format!(
                "does not appear to be GDAL ogr2ogr (version output: {:?}) {}",
                version,
                output.stderr.trim()
            ),
        })
    }

    /// Convert `kml_path` into the shapefile family at `shp_path`.
    ///
    /// Success requires a zero exit code and the `.shp`, `.shx` and `.dbf`
    /// files present afterwards. No retries.
    #[instrument(skip_all, fields(kml = %kml_path.display(), shp = %shp_path.display()))]
    pub fn convert(&self, kml_path: &Path, shp_path: &Path) -> Result<ShapefileOutput> {
        let family = shapefile_family(shp_path);
        let preexisting: Vec<bool> = family.iter().map(|p| p.exists()).collect();

        let args: Vec<OsString> = vec![
            "-f".into(),
            "ESRI Shapefile".into(),
            "-overwrite".into(),
            shp_path.into(),
            kml_path.into(),
        ];

        let result = self
            .runner
            .run(&args)
            .and_then(|output| self.check_output(output, shp_path));

        match result {
            Ok(warnings) => {
                let files = family.into_iter().filter(|p| p.exists()).collect();
                Ok(ShapefileOutput { files, warnings })
            }
            Err(e) => {
                remove_new_files(&family, &preexisting);
                Err(e)
            }
        }
    }

    fn check_output(&self, output: ToolOutput, shp_path: &Path) -> Result<Vec<String>> {
        let warnings: Vec<String> = output
            .stderr
            .lines()
            .filter(|l| l.starts_with("Warning "))
            .map(str::to_string)
            .collect();
        for line in &warnings {
            warn!(tool = %self.tool, "{line}");
        }

        if !output.success() {
            return Err(Gps2ShpError::ExternalTool {
                tool: self.tool.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        let missing: Vec<String> = SHAPEFILE_REQUIRED
            .iter()
            .map(|ext| shp_path.with_extension(ext))
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            let mut stderr = output.stderr;
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("expected output missing: {}", missing.join(", ")));
            return Err(Gps2ShpError::ExternalTool {
                tool: self.tool.clone(),
                exit_code: output.exit_code,
                stderr,
            });
        }

        Ok(warnings)
    }
}

/// Remove family members created by a failed run; leave older files alone.
fn remove_new_files(family: &[PathBuf], preexisting: &[bool]) {
    for (path, existed) in family.iter().zip(preexisting) {
        if !existed && path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "could not remove partial output");
            }
        }
    }
}
