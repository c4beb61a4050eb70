use apkharvest::{default_thread_count, logging, CatalogEntry, Config, Pipeline, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Force re-decompile even if version unchanged
    #[arg(long)]
    force: bool,

    /// Process apps from a single developer (e.g., 'Google LLC')
    #[arg(long)]
    developer: Option<String>,

    /// Process a single package (e.g., com.google.android.gm)
    #[arg(long)]
    package: Option<String>,

    /// List discovered apps and stored versions without downloading
    #[arg(long)]
    list: bool,

    /// Root directory for artifacts, sources, versions, and tools
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Worker threads passed to the decompiler (defaults to CPU count)
    #[arg(long)]
    threads: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    // Determine which developers to scrape
    let developers = match &cli.developer {
        Some(name) => match config.match_developer(name) {
            Ok(canonical) => vec![canonical],
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        },
        None => config.developers.clone(),
    };

    // The bootstrap collaborator provisions jadx; we only verify it is there.
    if !cli.list && !config.jadx_path().exists() {
        error!(
            "jadx not found at {}. Provision the decompiler first.",
            config.jadx_path().display()
        );
        process::exit(1);
    }

    let threads = cli.threads.unwrap_or_else(default_thread_count);
    let pipeline = Pipeline::new(config, cli.force, threads)?;

    info!("=== Discovering apps ===");
    let mut entries = pipeline.discover(&developers).await;
    info!("Discovered {} apps", entries.len());

    if let Some(package) = &cli.package {
        entries.retain(|entry| &entry.identity == package);
        if entries.is_empty() {
            error!("Package '{}' not found in discovered apps", package);
            process::exit(1);
        }
    }

    if cli.list {
        print_catalog(&pipeline, &mut entries);
        return Ok(());
    }

    info!("CPUs: {}", threads);
    let summary = pipeline.run(&entries).await;
    print_summary(&summary);

    if summary.has_failures() {
        process::exit(1);
    }
    Ok(())
}

/// Prints the discovered catalog with stored versions, sorted by developer.
/// Read-only: touches nothing but the ledger.
fn print_catalog(pipeline: &Pipeline, entries: &mut [CatalogEntry]) {
    entries.sort_by(|a, b| a.vendor.cmp(&b.vendor));

    println!("\n{:<55} {:<40} {}", "Package", "Version", "Developer");
    println!("{}", "-".repeat(130));
    for entry in entries {
        let stored = pipeline.ledger().get(&entry.identity).unwrap_or_default();
        println!("  {:<53} {:<40} {}", entry.identity, stored, entry.vendor);
    }
}

fn print_summary(summary: &apkharvest::RunSummary) {
    println!("\n{}", "=".repeat(60));
    println!("Summary");
    println!("{}", "=".repeat(60));
    for outcome in &summary.outcomes {
        let status = if outcome.succeeded { "OK" } else { "FAILED" };
        println!("  {}: {}", outcome.identity, status);
    }
    println!(
        "\n  {} succeeded, {} failed, {} total",
        summary.succeeded(),
        summary.failed(),
        summary.total()
    );
}
