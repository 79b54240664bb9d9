//! Application configuration for gps2shp.
//!
//! User config lives at `~/.gps2shp/gps2shp.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Gps2ShpError, Result};
use crate::types::{GeometryKind, OutputFormat, RecordLayout};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "gps2shp.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".gps2shp";

/// Executable searched on `PATH` when no override is configured.
pub const DEFAULT_TOOL: &str = "ogr2ogr";

// ---------------------------------------------------------------------------
// Config structs (matching gps2shp.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// How input files are read.
    #[serde(default)]
    pub input: InputConfig,

    /// Which outputs are produced and where.
    #[serde(default)]
    pub output: OutputConfig,

    /// External conversion tool settings.
    #[serde(default)]
    pub tool: ToolConfig,

    /// KML styling.
    #[serde(default)]
    pub style: StyleConfig,
}

/// `[input]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Field delimiter. A single space splits on any run of whitespace.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Number of leading rows to skip (headers).
    #[serde(default)]
    pub skip_rows: usize,

    /// Column layout.
    #[serde(default)]
    pub layout: RecordLayout,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            skip_rows: 0,
            layout: RecordLayout::default(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Formats to produce.
    #[serde(default)]
    pub format: OutputFormat,

    /// Directory for outputs. Unset means next to each input file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Replace destination files that already exist.
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// KML geometry.
    #[serde(default)]
    pub geometry: GeometryKind,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            out_dir: None,
            overwrite: true,
            geometry: GeometryKind::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[tool]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path or name of the conversion executable.
    #[serde(default = "default_tool")]
    pub path: String,

    /// Seconds before a running conversion is killed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Stop at the first failed output instead of continuing with the batch.
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: default_tool(),
            timeout_secs: default_timeout_secs(),
            fail_fast: false,
        }
    }
}

fn default_tool() -> String {
    DEFAULT_TOOL.into()
}
fn default_timeout_secs() -> u64 {
    300
}

/// `[style]` section. Colours are KML `aabbggrr` hex strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    #[serde(default = "default_line_color")]
    pub line_color: String,

    #[serde(default = "default_line_width")]
    pub line_width: f64,

    #[serde(default = "default_poly_color")]
    pub poly_color: String,

    #[serde(default = "default_true")]
    pub fill: bool,

    #[serde(default = "default_true")]
    pub outline: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            line_color: default_line_color(),
            line_width: default_line_width(),
            poly_color: default_poly_color(),
            fill: true,
            outline: true,
        }
    }
}

fn default_line_color() -> String {
    "ff0000ff".into()
}
fn default_line_width() -> f64 {
    1.5
}
fn default_poly_color() -> String {
    "7d0000ff".into()
}

// ---------------------------------------------------------------------------
// Conversion config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime conversion configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub delimiter: char,
    pub skip_rows: usize,
    pub layout: RecordLayout,
    pub format: OutputFormat,
    pub out_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub geometry: GeometryKind,
    /// Path or name of the conversion executable.
    pub tool_path: String,
    pub timeout: Duration,
    pub fail_fast: bool,
    pub style: StyleConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ConversionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            delimiter: config.input.delimiter,
            skip_rows: config.input.skip_rows,
            layout: config.input.layout,
            format: config.output.format,
            out_dir: config.output.out_dir.clone(),
            overwrite: config.output.overwrite,
            geometry: config.output.geometry,
            tool_path: config.tool.path.clone(),
            timeout: Duration::from_secs(config.tool.timeout_secs),
            fail_fast: config.tool.fail_fast,
            style: config.style.clone(),
        }
    }
}

impl ConversionConfig {
    /// Reject settings that can never produce a valid run.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter == '\n' || self.delimiter == '\r' {
            return Err(Gps2ShpError::config("delimiter cannot be a line break"));
        }
        if matches!(self.delimiter, '.' | '-' | '+') || self.delimiter.is_ascii_digit() {
            return Err(Gps2ShpError::config(format!(
                "delimiter '{}' collides with numeric fields",
                self.delimiter
            )));
        }
        if self.timeout.is_zero() {
            return Err(Gps2ShpError::config("tool timeout must be at least 1 second"));
        }
        if self.format.wants_shapefile() && self.tool_path.trim().is_empty() {
            return Err(Gps2ShpError::config("tool path is empty"));
        }
        for color in [&self.style.line_color, &self.style.poly_color] {
            if color.len() != 8 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Gps2ShpError::config(format!(
                    "colour '{color}' is not an aabbggrr hex value"
                )));
            }
        }
        if !self.style.line_width.is_finite() || self.style.line_width <= 0.0 {
            return Err(Gps2ShpError::config(format!(
                "line width {} must be a positive number",
                self.style.line_width
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.gps2shp/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Gps2ShpError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.gps2shp/gps2shp.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Gps2ShpError::config(format!("failed to read {}: {e}", path.display()))
    })?;

    toml::from_str(&content)
        .map_err(|e| Gps2ShpError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`. Refuses to replace an existing file.
pub fn init_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Gps2ShpError::config(format!(
            "{} already exists; remove it first to reset",
            path.display()
        )));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| Gps2ShpError::config(format!("cannot create {}: {e}", dir.display())))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| Gps2ShpError::config(e.to_string()))?;

    std::fs::write(path, content)
        .map_err(|e| Gps2ShpError::config(format!("cannot write {}: {e}", path.display())))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("delimiter"));
        assert!(toml_str.contains("ogr2ogr"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.input.delimiter, ',');
        assert_eq!(parsed.tool.timeout_secs, 300);
        assert_eq!(parsed.output.format, OutputFormat::Both);
        assert!(parsed.output.overwrite);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[input]
delimiter = ";"
skip_rows = 1

[output]
format = "kml"
geometry = "polygon"

[tool]
path = "/opt/gdal/bin/ogr2ogr"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.input.delimiter, ';');
        assert_eq!(config.input.skip_rows, 1);
        assert_eq!(config.input.layout, RecordLayout::Labeled);
        assert_eq!(config.output.format, OutputFormat::Kml);
        assert_eq!(config.output.geometry, GeometryKind::Polygon);
        assert_eq!(config.tool.path, "/opt/gdal/bin/ogr2ogr");
        assert_eq!(config.tool.timeout_secs, 300);
        assert_eq!(config.style.line_width, 1.5);
    }

    #[test]
    fn conversion_config_from_app_config() {
        let app = AppConfig::default();
        let conv = ConversionConfig::from(&app);
        assert_eq!(conv.delimiter, ',');
        assert_eq!(conv.timeout, Duration::from_secs(300));
        assert_eq!(conv.tool_path, DEFAULT_TOOL);
        assert!(!conv.fail_fast);
        assert!(conv.validate().is_ok());
    }

    #[test]
    fn conversion_config_rejects_bad_settings() {
        let mut conv = ConversionConfig {
            delimiter: '.',
            ..ConversionConfig::default()
        };
        assert!(conv.validate().is_err());

        conv.delimiter = ',';
        conv.timeout = Duration::ZERO;
        assert!(conv.validate().is_err());

        conv.timeout = Duration::from_secs(5);
        conv.style.line_color = "red".into();
        let err = conv.validate().unwrap_err();
        assert!(err.to_string().contains("aabbggrr"));
    }

    #[test]
    fn digit_delimiters_and_bad_line_widths_rejected() {
        for delimiter in ['0', '7'] {
            let conv = ConversionConfig {
                delimiter,
                ..ConversionConfig::default()
            };
            let err = conv.validate().unwrap_err();
            assert!(err.to_string().contains("collides with numeric fields"));
        }

        for width in [f64::NAN, f64::INFINITY, -1.0, 0.0] {
            let mut conv = ConversionConfig::default();
            conv.style.line_width = width;
            let err = conv.validate().unwrap_err();
            assert!(err.to_string().contains("line width"), "width {width}");
        }
    }

    #[test]
    fn load_config_from_missing_file_fails() {
        let path = std::env::temp_dir().join(format!(
            "gps2shp-missing-{}.toml",
            uuid::Uuid::now_v7()
        ));
        let err = load_config_from(&path).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn init_config_at_writes_defaults_once() {
        let dir = std::env::temp_dir().join(format!("gps2shp-config-{}", uuid::Uuid::now_v7()));
        let path = dir.join("nested").join("gps2shp.toml");

        init_config_at(&path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.tool.path, DEFAULT_TOOL);

        let err = init_config_at(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
