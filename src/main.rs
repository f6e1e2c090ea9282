use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use protoscope::cli::Cli;
use protoscope::detector::ProtocolDetector;
use protoscope::network::parse_targets;
use protoscope::output::OutputWriter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "protoscope=debug" } else { "protoscope=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    if cli.target.is_empty() {
        eprintln!("{}", "Error: No target specified.".red());
        eprintln!("Example: protoscope 192.168.1.1:22");
        eprintln!("Run 'protoscope --help' for more information.");
        std::process::exit(1);
    }

    let targets = parse_targets(&cli.target.join(","), cli.port)?;

    let progress = ProgressBar::new(targets.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.green/black} {pos}/{len} probed ({eta})")?
            .progress_chars("=> "),
    );

    let detector = ProtocolDetector::new();
    let report = detector
        .detect_all(
            &targets,
            cli.protocol,
            cli.concurrency,
            Duration::from_secs_f64(cli.timeout),
            Some(progress.clone()),
        )
        .await;
    progress.finish_and_clear();

    let writer = OutputWriter::new(cli.output_format, cli.output_file)?;
    writer.write(&report)?;

    Ok(())
}
