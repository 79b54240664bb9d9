//! gps2shp CLI: convert GPS coordinate files to KML and ESRI Shapefiles.
//!
//! Validates every input and destination first; a batch with any problem
//! is rejected without writing a single file.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
