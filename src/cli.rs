use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "protoscope")]
#[command(version)]
#[command(about = "Detect which protocol answers on a TCP endpoint, then hand off a matching client", long_about = None)]
pub struct Cli {
    #[arg(help = "Targets as host or host:port. Can be specified multiple times.")]
    pub target: Vec<String>,

    #[arg(short = 'p', long, help = "Port to use for targets given without one")]
    pub port: Option<u16>,

    #[arg(
        short = 'P',
        long,
        value_enum,
        default_value = "auto",
        help = "Protocol hint: tunes the probe strategy but never forces the verdict"
    )]
    pub protocol: ProtocolHint,

    #[arg(short, long, default_value_t = 50, help = "Maximum simultaneously open connections")]
    pub concurrency: usize,

    #[arg(short, long, default_value_t = 10.0, help = "Per-host detection timeout in seconds")]
    pub timeout: f64,

    #[arg(short = 'o', long, value_enum, default_value = "plain", help = "Output format")]
    pub output_format: OutputFormat,

    #[arg(short = 'f', long, help = "Output file path (default: stdout)")]
    pub output_file: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

/// Probe-strategy hint. `Auto` tries a passive listen first and escalates to
/// active probing; a specific hint issues exactly one probe tuned for that
/// protocol. Detection stays observational either way.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ProtocolHint {
    Auto,
    Ssh,
    Http,
    Https,
    Telnet,
    Ftp,
}

impl std::fmt::Display for ProtocolHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolHint::Auto => write!(f, "auto"),
            ProtocolHint::Ssh => write!(f, "ssh"),
            ProtocolHint::Http => write!(f, "http"),
            ProtocolHint::Https => write!(f, "https"),
            ProtocolHint::Telnet => write!(f, "telnet"),
            ProtocolHint::Ftp => write!(f, "ftp"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[value(name = "plain", help = "Human-readable output")]
    Plain,
    #[value(name = "json", help = "JSON output")]
    Json,
    #[value(name = "csv", help = "CSV output")]
    Csv,
}
