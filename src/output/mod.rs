//! Detection output formatting and writing

pub mod formats;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::config::{OutputConfig, OutputFormat};
use crate::detect::events::DetectionEvent;

pub use formats::{format_json, format_text};

/// Output writer that handles multiple destinations
pub struct OutputWriter {
    config: OutputConfig,
    file: Option<File>,
    written: u32,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(config: OutputConfig) -> io::Result<Self> {
        let file = if let Some(ref path) = config.output_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            file,
            written: 0,
        })
    }

    /// Write a detection event. Events without a printable form are skipped.
    pub fn write(&mut self, event: &DetectionEvent, offset_ms: i64) -> io::Result<()> {
        let Some(formatted) = self.format(event, offset_ms) else {
            return Ok(());
        };
        self.written += 1;

        // Write to console if enabled
        if self.config.enable_console {
            self.write_console(&formatted)?;
        }

        // Write to file if configured
        if let Some(ref mut file) = self.file {
            writeln!(file, "{}", formatted)?;
            file.flush()?;
        }

        Ok(())
    }

    fn format(&self, event: &DetectionEvent, offset_ms: i64) -> Option<String> {
        match self.config.format {
            OutputFormat::Text => format_text(event, offset_ms, self.config.enable_timestamps),
            OutputFormat::Json => format_json(event, offset_ms),
        }
    }

    fn write_console(&self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()
    }

    /// Number of events written so far
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }

    /// Get the output file path if configured
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.config.output_path.as_ref()
    }
}

/// Format milliseconds as HH:MM:SS.mmm
pub fn format_timestamp(ms: i64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = ms % 1000;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}
