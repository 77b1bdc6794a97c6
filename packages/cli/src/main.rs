#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the solar map site pipeline.
//!
//! Uses `indicatif-log-bridge` (via [`solar_map_cli_utils::init_logger`])
//! so log lines and the site progress bar share the terminal cleanly.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::{Parser, Subcommand};
use solar_map_cli_utils::IndicatifProgress;
use solar_map_pipeline::sites::load_sites;
use solar_map_pipeline::{PipelineConfig, SiteBatchOrchestrator, backends};

#[derive(Parser)]
#[command(name = "solar_map", about = "Rooftop PV detection and site enrichment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a site list
    Run {
        /// CSV or spreadsheet (.xlsx) with `sample_id`, `latitude`, `longitude` columns
        #[arg(long)]
        sites: PathBuf,
        /// Directory for images, per-site records, overlays, and aggregates
        #[arg(long)]
        output: PathBuf,
        /// TOML configuration file (defaults to `SOLAR_MAP_CONFIG`)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Imagery provider id (see `solar_map providers`)
        #[arg(long)]
        provider: Option<String>,
        /// Precomputed predictions JSON
        #[arg(long, conflicts_with = "detector_url")]
        predictions: Option<PathBuf>,
        /// HTTP inference endpoint
        #[arg(long)]
        detector_url: Option<String>,
        /// Maximum number of sites processed at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Process at most this many sites
        #[arg(long)]
        limit: Option<usize>,
        /// Tile zoom level
        #[arg(long)]
        zoom: Option<i32>,
    },
    /// List built-in imagery providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = solar_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Providers => {
            let providers = solar_map_imagery::registry::all_providers();
            println!("{:<16} {:<18} NAME", "ID", "TYPE");
            println!("{}", "-".repeat(60));
            for p in &providers {
                println!("{:<16} {:<18} {}", p.id, p.provider.kind(), p.name);
            }
        }
        Commands::Run {
            sites,
            output,
            config,
            provider,
            predictions,
            detector_url,
            concurrency,
            limit,
            zoom,
        } => {
            let mut config = PipelineConfig::resolve(config.as_deref())?;
            if let Some(provider) = provider {
                config.imagery.provider = provider;
            }
            if let Some(path) = predictions {
                config.detection.predictions = Some(path);
                config.detection.url = None;
            }
            if let Some(url) = detector_url {
                config.detection.url = Some(url);
                config.detection.predictions = None;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if limit.is_some() {
                config.limit = limit;
            }
            if let Some(zoom) = zoom {
                config.zoom = zoom;
            }
            config.validate()?;

            let site_list = load_sites(&sites)?;
            let fetcher = backends::imagery(&config)?;
            let detector = backends::detector(&config)?;

            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = Arc::clone(&cancel);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        log::warn!("Interrupted; finishing in-flight sites");
                        cancel.store(true, Ordering::SeqCst);
                    }
                });
            }

            let start = Instant::now();
            let progress = IndicatifProgress::sites_bar(&multi, "Sites");
            let orchestrator = SiteBatchOrchestrator::new(fetcher, detector, config, &output);
            let report = orchestrator
                .run(site_list, progress.as_ref(), &cancel)
                .await?;

            log::info!(
                "Processed {} sites ({} skipped) in {:.1}s; results in {}",
                report.summary.completed,
                report.summary.failed,
                start.elapsed().as_secs_f64(),
                orchestrator.output_dir().display()
            );
        }
    }

    Ok(())
}
