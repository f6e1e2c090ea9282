use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use colored::*;

use crate::cli::OutputFormat;
use crate::detector::results::{Confidence, DetectionReport};

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Result<Self> {
        Ok(Self { format, file })
    }

    pub fn write(&self, report: &DetectionReport) -> Result<()> {
        let output = match self.format {
            OutputFormat::Plain => self.format_plain(report),
            OutputFormat::Json => self.format_json(report)?,
            OutputFormat::Csv => self.format_csv(report),
        };

        match &self.file {
            Some(path) => {
                let file = File::create(path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }

        Ok(())
    }

    fn format_plain(&self, report: &DetectionReport) -> String {
        let mut output = String::new();

        let elapsed = (report.finished - report.started).num_milliseconds();
        output.push_str(&format!(
            "\n{} {} targets in {}ms\n\n",
            "DETECTION COMPLETE".green().bold(),
            report.total_targets,
            elapsed
        ));

        let mut detected = 0;
        for result in &report.results {
            let endpoint = format!("{}:{}", result.host, result.port);

            if let Some(error) = &result.error {
                output.push_str(&format!(
                    "  {:<28} {} ({})\n",
                    endpoint.bold(),
                    "unreachable".red(),
                    error
                ));
                continue;
            }

            let protocol = match result.confidence {
                Confidence::High => result.protocol.to_string().green().bold(),
                Confidence::Medium => result.protocol.to_string().yellow().bold(),
                Confidence::None => result.protocol.to_string().dimmed(),
            };
            let evidence = String::from_utf8_lossy(&result.evidence);
            let evidence = evidence.trim();

            if result.confidence != Confidence::None {
                detected += 1;
            }

            output.push_str(&format!(
                "  {:<28} {} [{}] {}\n",
                endpoint.bold(),
                protocol,
                result.confidence.to_string().dimmed(),
                evidence.dimmed()
            ));
        }

        output.push_str(&format!(
            "\n{} {} of {} endpoints identified\n",
            "▶".green(),
            detected,
            report.results.len()
        ));

        output
    }

    fn format_json(&self, report: &DetectionReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    fn format_csv(&self, report: &DetectionReport) -> String {
        let mut csv = String::new();
        csv.push_str("host,port,protocol,confidence,evidence,error,elapsed_ms\n");

        for result in &report.results {
            let evidence = csv_field(&String::from_utf8_lossy(&result.evidence));
            let error = result
                .error
                .as_ref()
                .map(|e| csv_field(&e.to_string()))
                .unwrap_or_default();

            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                result.host,
                result.port,
                result.protocol,
                result.confidence,
                evidence,
                error,
                result.elapsed_ms
            ));
        }

        csv
    }
}

/// Banners can contain anything; flatten newlines and commas so rows stay
/// one line each.
fn csv_field(value: &str) -> String {
    value
        .replace(['\r', '\n'], " ")
        .replace(',', ";")
        .trim()
        .to_string()
}
