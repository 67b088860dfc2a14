//! Rendering of scan results: aligned text, JSON, JSON lines or CSV.

use anyhow::Result;
use clap::ValueEnum;
use scan_core::ScanResult;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Jsonl,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        OutputFormat::from_str(name, true).ok()
    }
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// `PROTOCOL PORT [TIME(ms)] [GUESS]`, columns padded for alignment.
pub fn text_line(r: &ScanResult, verbose: bool, guess: bool) -> String {
    let mut line = format!("{:<9} {:<6}", r.protocol.as_str(), r.port);
    if verbose {
        line.push_str(&format!(" {:<10}", r.elapsed.as_millis()));
    }
    if guess {
        line.push_str(&format!(" {:<6}", r.guessed_service.as_deref().unwrap_or("-")));
    }
    line.trim_end().to_string()
}

#[derive(Serialize)]
struct Record<'a> {
    target: &'a str,
    #[serde(flatten)]
    result: &'a ScanResult,
    observed_at: String,
}

#[derive(Serialize)]
struct Report<'a> {
    target: &'a str,
    started_at: &'a str,
    ended_at: String,
    scanned: usize,
    open: &'a [ScanResult],
}

enum Mode {
    Text { verbose: bool, guess: bool },
    Json { started_at: String, collected: Vec<ScanResult> },
    Jsonl,
    Csv(csv::Writer<File>),
}

/// Receives results as they arrive; `finish` flushes whatever was buffered.
pub struct Output {
    target: String,
    mode: Mode,
    writer: Box<dyn Write>,
}

impl Output {
    pub fn new(
        target: String,
        format: OutputFormat,
        verbose: bool,
        guess: bool,
        out: Option<&Path>,
        csv: bool,
    ) -> Result<Self> {
        let writer: Box<dyn Write> = match out {
            Some(path) if !csv => Box::new(BufWriter::new(File::create(path)?)),
            _ => Box::new(io::stdout()),
        };
        let mode = match (csv, out) {
            (true, Some(path)) => {
                let mut wtr = csv::Writer::from_writer(File::create(path)?);
                wtr.write_record(["protocol", "port", "elapsed_ms", "guess"])?;
                Mode::Csv(wtr)
            }
            (true, None) => {
                tracing::warn!("--csv requires --out <file>; falling back to {format:?}");
                Self::mode_for(format, verbose, guess)
            }
            _ => Self::mode_for(format, verbose, guess),
        };
        Ok(Output { target, mode, writer })
    }

    fn mode_for(format: OutputFormat, verbose: bool, guess: bool) -> Mode {
        match format {
            OutputFormat::Text => Mode::Text { verbose, guess },
            OutputFormat::Json => Mode::Json { started_at: now_rfc3339(), collected: Vec::new() },
            OutputFormat::Jsonl => Mode::Jsonl,
        }
    }

    #[cfg(test)]
    fn to_writer(target: &str, mode: Mode, writer: Box<dyn Write>) -> Self {
        Output { target: target.to_string(), mode, writer }
    }

    pub fn emit(&mut self, r: ScanResult) -> Result<()> {
        match &mut self.mode {
            Mode::Text { verbose, guess } => {
                writeln!(self.writer, "{}", text_line(&r, *verbose, *guess))?;
            }
            Mode::Json { collected, .. } => collected.push(r),
            Mode::Jsonl => {
                let rec = Record { target: &self.target, result: &r, observed_at: now_rfc3339() };
                writeln!(self.writer, "{}", serde_json::to_string(&rec)?)?;
            }
            Mode::Csv(wtr) => {
                wtr.write_record([
                    r.protocol.as_str().to_string(),
                    r.port.to_string(),
                    r.elapsed.as_millis().to_string(),
                    r.guessed_service.clone().unwrap_or_default(),
                ])?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self, scanned: usize) -> Result<()> {
        match &mut self.mode {
            Mode::Json { started_at, collected } => {
                collected.sort_by_key(|r| (r.protocol.as_str(), r.port));
                let report = Report {
                    target: &self.target,
                    started_at: started_at.as_str(),
                    ended_at: now_rfc3339(),
                    scanned,
                    open: collected.as_slice(),
                };
                writeln!(self.writer, "{}", serde_json::to_string_pretty(&report)?)?;
            }
            Mode::Csv(wtr) => wtr.flush()?,
            Mode::Text { .. } | Mode::Jsonl => {}
        }
        self.writer.flush()?;
        Ok(())
    }
}
