//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, eyre};
use gps2shp_core::{Pipeline, ProgressReporter, RunOutcome, ValidationReport, check};
use gps2shp_ogr::ProcessRunner;
use gps2shp_shared::{
    AppConfig, ConversionConfig, GeometryKind, OutputFormat, RecordLayout, config_file_path,
    init_config_at, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// gps2shp: convert GPS coordinate files to KML and ESRI Shapefiles.
#[derive(Parser, Debug)]
#[command(
    name = "gps2shp",
    version,
    about = "Convert delimited GPS coordinate files to KML and ESRI Shapefiles.",
    long_about = "Every input file and every destination is validated before anything \
                  is written. If any file has a problem, nothing is converted."
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.gps2shp/gps2shp.toml.
    #[arg(long, global = true, env = "GPS2SHP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Run report format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum FormatArg {
    Kml,
    Shp,
    Both,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Kml => Self::Kml,
            FormatArg::Shp => Self::Shp,
            FormatArg::Both => Self::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum LayoutArg {
    /// label, latitude, longitude[, elevation]
    Labeled,
    /// longitude, latitude[, elevation]
    LonLat,
}

impl From<LayoutArg> for RecordLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Labeled => Self::Labeled,
            LayoutArg::LonLat => Self::LonLat,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum GeometryArg {
    /// One placemark per record.
    Points,
    /// One closed polygon through all records.
    Polygon,
}

impl From<GeometryArg> for GeometryKind {
    fn from(arg: GeometryArg) -> Self {
        match arg {
            GeometryArg::Points => Self::Points,
            GeometryArg::Polygon => Self::Polygon,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Validate and convert input files.
    Convert {
        #[command(flatten)]
        args: ConvertArgs,

        /// Stop after the first output that fails and skip the remaining files.
        #[arg(long)]
        fail_fast: bool,
    },

    /// Validate input files and destinations without writing anything.
    Check {
        #[command(flatten)]
        args: ConvertArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags shared by `convert` and `check`. Unset flags fall back to the
/// config file.
#[derive(Args, Debug, Default)]
pub(crate) struct ConvertArgs {
    /// Delimited GPS files to convert.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Outputs to produce.
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Directory for outputs (defaults to each input's directory).
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Field delimiter: a single character, or `tab` / `space`.
    #[arg(short, long, value_parser = parse_delimiter)]
    pub delimiter: Option<char>,

    /// Header lines to skip at the top of each file.
    #[arg(long)]
    pub skip_rows: Option<usize>,

    /// Column layout of each record.
    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,

    /// Geometry written to the outputs.
    #[arg(long, value_enum)]
    pub geometry: Option<GeometryArg>,

    /// Path to the ogr2ogr executable.
    #[arg(long)]
    pub exe_path: Option<String>,

    /// Seconds to wait for ogr2ogr before killing it.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Refuse to replace existing output files.
    #[arg(long)]
    pub no_clobber: bool,

    /// Report format printed on stdout.
    #[arg(long, value_enum, default_value = "text")]
    pub report: ReportFormat,
}

impl ConvertArgs {
    /// Layer flag values over the file-derived config.
    pub(crate) fn apply(&self, mut config: ConversionConfig) -> ConversionConfig {
        if let Some(format) = self.format {
            config.format = format.into();
        }
        if let Some(dir) = &self.out_dir {
            config.out_dir = Some(dir.clone());
        }
        if let Some(delimiter) = self.delimiter {
            config.delimiter = delimiter;
        }
        if let Some(skip_rows) = self.skip_rows {
            config.skip_rows = skip_rows;
        }
        if let Some(layout) = self.layout {
            config.layout = layout.into();
        }
        if let Some(geometry) = self.geometry {
            config.geometry = geometry.into();
        }
        if let Some(exe) = &self.exe_path {
            config.tool_path = exe.clone();
        }
        if let Some(secs) = self.timeout {
            config.timeout = std::time::Duration::from_secs(secs);
        }
        if self.no_clobber {
            config.overwrite = false;
        }
        config
    }
}

fn parse_delimiter(raw: &str) -> std::result::Result<char, String> {
    match raw {
        "tab" | "\\t" => Ok('\t'),
        "space" => Ok(' '),
        _ => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("expected a single character, got {raw:?}")),
            }
        }
    }
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so reports on
/// stdout stay machine-readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gps2shp=warn",
        1 => "gps2shp=info",
        2 => "gps2shp=debug",
        _ => "gps2shp=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match &cli.command {
        Command::Convert { args, fail_fast } => cmd_convert(config_path, args, *fail_fast),
        Command::Check { args } => cmd_check(config_path, args),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn resolve_config(path: Option<&Path>, args: &ConvertArgs) -> Result<ConversionConfig> {
    let app = load_app_config(path)?;
    let config = args.apply(ConversionConfig::from(&app));
    config.validate()?;
    debug!(?config, "resolved conversion config");
    Ok(config)
}

fn cmd_convert(path: Option<&Path>, args: &ConvertArgs, fail_fast: bool) -> Result<ExitCode> {
    let mut config = resolve_config(path, args)?;
    config.fail_fast |= fail_fast;

    info!(
        files = args.files.len(),
        format = config.format.describe(),
        "starting conversion"
    );

    let runner = ProcessRunner::new(config.tool_path.clone(), config.timeout);
    let progress = CliProgress::new();
    let mut pipeline = Pipeline::new(config, Box::new(runner));
    let outcome = pipeline.run(&args.files, &progress)?;

    print_outcome(&outcome, args.report)?;
    Ok(ExitCode::from(outcome.exit_code()))
}

fn cmd_check(path: Option<&Path>, args: &ConvertArgs) -> Result<ExitCode> {
    let config = resolve_config(path, args)?;
    let runner = ProcessRunner::new(config.tool_path.clone(), config.timeout);
    let progress = CliProgress::new();

    let report = check(&config, &runner, &args.files, &progress)?;
    progress.finish();

    print_report(&report, args.report)?;
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_outcome(outcome: &RunOutcome, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => println!("{outcome}"),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.to_json())?),
    }
    Ok(())
}

fn print_report(report: &ValidationReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => println!("{report}"),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report.to_json())?),
    }
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<ExitCode> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    init_config_at(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(path: Option<&Path>) -> Result<ExitCode> {
    let config = load_app_config(path)?;
    let toml_str =
        toml::to_string_pretty(&config).map_err(|e| eyre!("cannot render config: {e}"))?;
    println!("{toml_str}");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn file_checked(&self, path: &Path, errors: usize, current: usize, total: usize) {
        let status = if errors == 0 {
            "ok".to_string()
        } else {
            format!("{errors} problem(s)")
        };
        self.spinner.set_message(format!(
            "Checked [{current}/{total}] {} ({status})",
            path.display()
        ));
    }

    fn output_written(&self, path: &Path) {
        self.spinner.set_message(format!("Wrote {}", path.display()));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.finish();
    }
}
