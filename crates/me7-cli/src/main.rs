//! me7log - ME7 K-line data logger
//!
//! Wakes the ECU over K-line, unlocks it, agrees on a log record with the
//! configured memory locations and writes one CSV line per record until
//! Ctrl-C.

mod config;
mod output;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "me7log")]
#[command(author, version, about = "ME7 K-line data logger")]
pub struct Cli {
    /// Logging config file (TOML)
    #[arg(short, long, env = "ME7LOG_CONFIG")]
    pub config: PathBuf,

    /// Output CSV file; records go to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Debug level: 0 quiet, 3 protocol responses, 4 every frame
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub debug: u8,

    /// Serial device of the K-line adapter
    #[arg(long, env = "ME7LOG_PORT", default_value = "/dev/ttyUSB0")]
    pub port: String,
}

fn log_filter(debug: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match debug {
            0 => "warn",
            1 | 2 => "info",
            3 => "debug",
            _ => "trace",
        })
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(log_filter(cli.debug))
        .init();

    run::run(&cli)
}
