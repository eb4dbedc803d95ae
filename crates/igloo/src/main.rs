use anyhow::{Context, Result};
use clap::Parser;
use igloo::common::StringUtf8Coder;
use igloo::{BundleExecutor, CoderRegistry, Create, Options};
use std::io::BufRead;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Splits a list of strings into bundles and reads them back in parallel.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with execution options. Defaults to $IGLOO_CONFIG_PATH.
    #[arg(short, long)]
    config: Option<String>,

    /// Desired bundle size in bytes.
    #[arg(short, long)]
    bundle_size: Option<u64>,

    /// Maximum number of bundles read at once.
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Values to read. Read from stdin, one per line, when none are given.
    values: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut options = match args.config.as_deref() {
        Some(path) => Options::load(Some(path))
            .with_context(|| format!("loading configuration from {path}"))?,
        None => Options::new().context("loading configuration")?,
    };
    if let Some(bytes) = args.bundle_size {
        options = options.with_desired_bundle_size_bytes(bytes);
    }
    if let Some(parallelism) = args.parallelism {
        options = options.with_max_parallelism(parallelism);
    }

    let values = if args.values.is_empty() {
        std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<Vec<_>>>()
            .context("reading values from stdin")?
    } else {
        args.values
    };
    info!(values = values.len(), ?options, "building in-memory source");

    let source = Create::of(values)
        .with_coder(Arc::new(StringUtf8Coder))
        .into_source(&CoderRegistry::standard())?;
    let report = BundleExecutor::new(options).run(source).await?;

    for value in &report.values {
        println!("{value}");
    }
    eprintln!(
        "{} records in {} bundles ({} dynamic splits)",
        report.values.len(),
        report.bundles.len(),
        report.dynamic_splits
    );
    for bundle in &report.bundles {
        eprintln!(
            "  [{:>6}, {:>6}) {:>6} records{}",
            bundle.start,
            bundle.end,
            bundle.records,
            if bundle.dynamic { "  (dynamic)" } else { "" }
        );
    }
    Ok(())
}
