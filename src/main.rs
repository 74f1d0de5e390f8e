use anyhow::{Context, Result};
use clap::Parser;
use tracecause::cli::Cli;
use tracecause::config::DiagnosisConfig;
use tracecause::invocation::TraceSnapshot;
use tracecause::report;
use tracecause::service::{DiagnosisJob, DiagnosisService};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(args: &Cli) -> Result<DiagnosisConfig> {
    let mut config = match &args.config {
        Some(path) => DiagnosisConfig::from_toml(path)?,
        None => DiagnosisConfig::default(),
    };

    if let Some(baseline) = args.baseline {
        config.baseline = baseline;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid command-line options")?;
    Ok(config)
}

fn load_jobs(args: &Cli) -> Result<Vec<DiagnosisJob>> {
    args.traces
        .iter()
        .map(|path| {
            let snapshot = TraceSnapshot::from_file(path)?;
            let (tree, root) = snapshot
                .to_tree()
                .with_context(|| format!("Failed to build call tree from {}", path.display()))?;
            Ok(DiagnosisJob::new(path.display().to_string(), tree, root))
        })
        .collect()
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let jobs = load_jobs(&args)?;

    let service = DiagnosisService::new(&config)?;
    let reports = service.diagnose_all(jobs);

    print!("{}", report::render(&reports, args.format)?);

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} traces could not be diagnosed", failed, reports.len());
    }

    Ok(())
}
