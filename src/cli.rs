//! CLI argument parsing for tracecause

use crate::report::ReportFormat;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tracecause")]
#[command(version)]
#[command(
    about = "Rule-based performance diagnosis of recorded call trees",
    long_about = None
)]
pub struct Cli {
    /// Trace snapshot files (JSON) to diagnose
    #[arg(value_name = "TRACE", required = true)]
    pub traces: Vec<PathBuf>,

    /// Baseline duration in ms (overrides the config file)
    #[arg(short, long, value_name = "MS")]
    pub baseline: Option<f64>,

    /// TOML file with diagnosis thresholds
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: ReportFormat,

    /// Number of traces diagnosed in parallel (overrides the config file)
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}
