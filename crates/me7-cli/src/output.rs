//! Operator messages and the CSV log sink

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use me7_conv::{header_line, ChannelDescriptor, DecodedSample};

use crate::config::LogConfig;

/// Where operator messages go
///
/// When the CSV stream owns stdout, messages move to stderr.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    to_stderr: bool,
}

impl Console {
    pub fn new(csv_on_stdout: bool) -> Self {
        Self {
            to_stderr: csv_on_stdout,
        }
    }

    pub fn info(&self, msg: &str) {
        if self.to_stderr {
            eprintln!("{}", msg);
        } else {
            println!("{}", msg);
        }
    }

    pub fn success(&self, msg: &str) {
        self.info(&msg.green().to_string());
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }
}

/// Human-readable summary of the loaded configuration
pub fn config_summary(config: &LogConfig, port: &str) -> String {
    let c = &config.connection;
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    let mut lines = vec![
        "From Config Files:".to_string(),
        format!("ECU File     : {}", c.ecu_file),
        format!("Sample Rate  : {}", c.sample_rate),
        format!("ME7L Cfg Ver : {}", or_dash(&c.protocol_version)),
        format!("Connect      : {}", c.connect_mode),
        format!("LogSpeed     : {}", c.baud),
        format!("Security     : level {}", c.security_level),
        format!("HWNumber     : {}", or_dash(&c.hw_number)),
        format!("SWNumber     : {}", or_dash(&c.sw_number)),
        format!("PartNumber   : {}", or_dash(&c.part_number)),
        format!("SWVersion    : {}", or_dash(&c.sw_version)),
        format!("EngineID     : {}", or_dash(&c.engine_id)),
        format!("Port         : {}", port),
        format!("Channels     : {}", config.channels.len()),
    ];
    for channel in &config.channels {
        lines.push(format!(
            "  {:<16} 0x{:06X} size {}",
            channel.name, channel.address, channel.size
        ));
    }
    lines.join("\n")
}

/// CSV log destination
pub struct LogWriter {
    out: BufWriter<Box<dyn Write>>,
    spinner: Option<ProgressBar>,
}

impl LogWriter {
    /// Write records to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()), None)
    }

    /// Write records to a file, with a progress spinner on stdout
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self::new(Box::new(file), Some(spinner())))
    }

    pub fn new(out: Box<dyn Write>, spinner: Option<ProgressBar>) -> Self {
        Self {
            out: BufWriter::new(out),
            spinner,
        }
    }

    pub fn write_header(&mut self, descriptors: &[ChannelDescriptor]) -> io::Result<()> {
        writeln!(self.out, "{}", header_line(descriptors))
    }

    pub fn write_sample(&mut self, sample: &DecodedSample) -> io::Result<()> {
        writeln!(self.out, "{}", sample.csv_line())?;
        if let Some(spinner) = &self.spinner {
            spinner.inc(1);
        }
        Ok(())
    }

    /// Flush buffered lines and clear the spinner
    pub fn finish(&mut self) -> io::Result<()> {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        self.out.flush()
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
    let style = ProgressStyle::with_template("{msg} {spinner} {pos} records")
        .map(|style| style.tick_chars("|/-\\ "))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message("Logging (ctrl-c to end):");
    pb
}
