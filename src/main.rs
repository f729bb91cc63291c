use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

mod cache;
mod config;
mod download;
mod model;
mod seed;
mod store;

use cache::Cache;
use config::Config;
use download::Downloader;
use model::processor::build_graph;
use model::records::project_graph;
use model::TravelMode;
use seed::centers::{attach_centers, default_centers, load_centers};
use seed::{seed_graph, UploadError, DEFAULT_BATCH_SIZE};
use store::rest::RestStore;

/// Seed the backend with a place's road network and its evacuation centers
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Place whose street network is downloaded
    #[arg(long, default_value = "Hagonoy, Bulacan")]
    place: String,

    /// Network type: walk, bike, drive, all or all_private
    #[arg(long, default_value = "walk")]
    network_type: TravelMode,

    /// Rows per insert request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Path to the cache directory
    #[arg(long, default_value = ".cache")]
    cache_dir: String,

    /// Refetch cached mapping data older than this
    #[arg(long, default_value_t = 24)]
    cache_max_age_hours: i64,

    /// Clear the cache before downloading
    #[arg(long)]
    clear_cache: bool,

    /// Keep every connected component instead of only the largest
    #[arg(long)]
    retain_all: bool,

    /// JSON file listing evacuation centers to use instead of the built-in ones
    #[arg(long)]
    centers: Option<PathBuf>,

    /// Only add the evacuation centers, leaving the road network untouched
    #[arg(long)]
    skip_graph: bool,
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let cli = Cli::parse();

    // Nothing touches the network until the credentials are known
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Supabase credentials are not configured: {}", e);
            error!("Set {} and {} in the environment or a .env file", config::URL_VAR, config::KEY_VAR);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cli, &config) {
        if e.downcast_ref::<UploadError>().is_some() {
            error!("{:#}", e);
            error!("Exiting due to insertion error");
            std::process::exit(1);
        }
        error!("An unexpected error occurred: {:?}", e);
        error!("Please check your internet connection, Supabase credentials, and the place name");
    }
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    let store = RestStore::new(config)
        .context("Failed to create store client")?;

    if cli.skip_graph {
        info!("Skipping road network download");
    } else {
        info!("Starting database population for {}", cli.place);

        let cache = Cache::new(&cli.cache_dir, Some(cache_max_age(cli.cache_max_age_hours)?))
            .context("Failed to create cache")?;
        if cli.clear_cache {
            info!("Clearing cache");
            cache.clear()
                .context("Failed to clear cache")?;
        }

        let downloader = Downloader::new(cache)?;
        let response = downloader.download(&cli.place, cli.network_type)
            .context("Failed to download street network")?;
        let graph = build_graph(&response, cli.network_type, cli.retain_all)
            .context("Failed to build street network")?;

        let records = project_graph(&graph);
        seed_graph(&store, &records, cli.batch_size)?;
    }

    let centers = match &cli.centers {
        Some(path) => load_centers(path)?,
        None => default_centers(),
    };
    attach_centers(&store, &centers);

    info!("Database population complete");
    Ok(())
}

fn cache_max_age(hours: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_hours(hours)
        .with_context(|| format!("Cache max age of {} hours is out of range", hours))
}
