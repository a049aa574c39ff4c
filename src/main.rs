use anyhow::{Context, Result};
use care_site_planner::{config, data, export, proposals, server, store};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use care_site_planner::store::CenterStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load medical centers from the open-data CSV exports into the store
    Ingest {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Compute district need and store one proposed center per district
    Propose {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the stored centers over HTTP
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write existing and proposed centers as GeoJSON
    Export {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "FILE", default_value = "centers.geojson")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Ingest { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let health = app_config
                .input
                .health_centers_csv
                .as_deref()
                .context("input.health_centers_csv is not set")?;
            let population = app_config
                .input
                .population_csv
                .as_deref()
                .context("input.population_csv is not set")?;

            let options = data::PipelineOptions {
                population_date: app_config.input.population_date.clone(),
            };
            let centers = data::load_centers(health, population, &options)?;

            let mut store = store::JsonFileStore::open(&app_config.store.path)?;
            let inserted = store.insert_batch(centers)?;
            println!("Inserted {} medical centers into {:?}", inserted.len(), store.path());
        }
        Commands::Propose { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let mut store = store::JsonFileStore::open(&app_config.store.path)?;
            let records = store.all()?;

            let run = proposals::propose(&records, &app_config.proposals.city);
            println!("{:<4} {:<28} {:>12} {:>8} {:>14}", "#", "district", "population", "centers", "pop/center");
            for (rank, district) in run.ranking.iter().enumerate() {
                println!(
                    "{:<4} {:<28} {:>12} {:>8} {:>14.1}",
                    rank + 1,
                    district.district,
                    district.total_population,
                    district.current_centers,
                    district.population_per_center
                );
            }

            let inserted = proposals::persist(&mut store, run.proposals, app_config.proposals.mode())?;
            println!("Stored {} proposals ({} records skipped)", inserted.len(), run.skipped);
        }
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let store = store::JsonFileStore::open(&app_config.store.path)?;
            server::start_server(app_config, Box::new(store)).await?;
        }
        Commands::Export { config, output } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let store = store::JsonFileStore::open(&app_config.store.path)?;
            let count = export::write_geojson(output, &store.all()?)?;
            println!("Exported {} centers to {:?}", count, output);
        }
    }

    Ok(())
}
