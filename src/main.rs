use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use deal_scout::engine;
use deal_scout::models::{Analysis, AnalysisFilters, DealRating, Listing, Source};
use deal_scout::store::{JsonFileBackend, ListingStore};
use deal_scout::transfer::{self, ImportMode};
use std::path::PathBuf;
use tracing::{info, Level};

/// Maintenance and inspection CLI over the local listing store
#[derive(Parser)]
#[command(name = "deal-scout", version, about = "Used-car deal scout")]
struct Cli {
    /// Path of the JSON file holding the listing mapping
    #[arg(long, default_value = "listings.json", global = true)]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show listing counts and price-drop summary
    Stats,
    /// Print one stored listing as JSON
    Get { id: String },
    /// Analyze a stored listing against the rest of the store
    Analyze {
        id: String,
        #[arg(long)]
        match_fuel: bool,
        #[arg(long)]
        match_drivetrain: bool,
        #[arg(long)]
        match_transmission: bool,
    },
    /// Analyze every search-provenance listing in one pass
    Batch,
    /// Import listings from a JSON file
    Import {
        file: PathBuf,
        /// Overwrite the store instead of merging
        #[arg(long)]
        replace: bool,
    },
    /// Export all listings to a file
    Export {
        file: PathBuf,
        /// Write CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },
    /// Delete one listing by id
    Delete { id: String },
    /// Delete every stored listing
    Clear,
    /// Remove listings last captured more than N days ago
    Prune { days: f64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let store = ListingStore::new(JsonFileBackend::new(&cli.store));

    match cli.command {
        Command::Stats => {
            let map = store.load_all().await?;
            let detail = map.values().filter(|l| l.source == Source::Detail).count();
            let drops = map
                .values()
                .filter(|l| {
                    l.price_history
                        .first()
                        .zip(l.price_history.last())
                        .map_or(false, |(first, last)| last.price_eur < first.price_eur)
                })
                .count();
            println!("{} listings stored", map.len());
            println!("{} with detail-page data", detail);
            println!("{} with a price drop since first seen", drops);
        }
        Command::Get { id } => match store.get(&id).await? {
            Some(listing) => println!("{}", serde_json::to_string_pretty(&listing)?),
            None => bail!("No listing stored for {}", id),
        },
        Command::Analyze {
            id,
            match_fuel,
            match_drivetrain,
            match_transmission,
        } => {
            let map = store.load_all().await?;
            let Some(target) = map.get(&id).cloned() else {
                bail!("No listing stored for {}", id);
            };
            let filters = AnalysisFilters {
                match_fuel,
                match_drivetrain,
                match_transmission,
            };
            print_analysis(&target, &engine::analyze(&target, &map, &filters));
        }
        Command::Batch => {
            let map = store.load_all().await?;
            let mut targets: Vec<Listing> = map
                .values()
                .filter(|l| l.source == Source::Search)
                .cloned()
                .collect();
            targets.sort_by(|a, b| a.id.cmp(&b.id));
            info!("Analyzing {} search listings against the full store", targets.len());

            let results = engine::analyze_batch(&targets, &map, &AnalysisFilters::default());
            for (i, (id, analysis)) in results.iter().enumerate() {
                match analysis {
                    Some(a) => match a.deal_score {
                        Some(score) => println!(
                            "{}. {} {:+.1}% ({})",
                            i + 1,
                            id,
                            score * 100.0,
                            DealRating::from_score(score).label()
                        ),
                        None => println!(
                            "{}. {} not enough data ({} comparables)",
                            i + 1,
                            id,
                            a.comparables_count
                        ),
                    },
                    None => println!("{}. {} skipped (no brand/model)", i + 1, id),
                }
            }
        }
        Command::Import { file, replace } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mode = if replace {
                ImportMode::Replace
            } else {
                ImportMode::Merge
            };
            let count = transfer::import_listings(&store, &raw, mode).await?;
            println!("Imported {} listings", count);
        }
        Command::Export { file, csv } => {
            let map = store.load_all().await?;
            let payload = if csv {
                transfer::export_csv(&map)?
            } else {
                transfer::export_json(&map)?
            };
            tokio::fs::write(&file, payload)
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("Exported {} listings to {}", map.len(), file.display());
        }
        Command::Delete { id } => {
            if store.delete(&id).await? {
                println!("Deleted {}", id);
            } else {
                println!("No listing stored for {}", id);
            }
        }
        Command::Clear => {
            store.clear_all().await?;
            println!("Store cleared");
        }
        Command::Prune { days } => {
            let removed = store.prune_older_than(days).await?;
            println!("Pruned {} listings", removed);
        }
    }

    Ok(())
}

fn print_analysis(target: &Listing, analysis: &Analysis) {
    if let Some(title) = &target.title {
        println!("{}", title);
    }
    println!("{}", target.id);
    match target.price_eur {
        Some(price) => println!("Asking price: {} EUR", price),
        None => println!("Asking price: unknown"),
    }
    match analysis.expected_price {
        Some(expected) => println!(
            "Expected price: {:.0} EUR ({} comparables)",
            expected, analysis.comparables_count
        ),
        None => println!(
            "Expected price: unknown ({} comparables)",
            analysis.comparables_count
        ),
    }
    match analysis.deal_score {
        Some(score) => println!(
            "Deal score: {:+.1}% ({})",
            score * 100.0,
            DealRating::from_score(score).label()
        ),
        None => println!("Not enough data for a deal score"),
    }

    if !analysis.comparables.is_empty() {
        println!();
        for (i, comp) in analysis.comparables.iter().enumerate() {
            println!(
                "{}. {} ({} EUR)",
                i + 1,
                comp.title.as_deref().unwrap_or(&comp.id),
                comp.price_eur
                    .map_or_else(|| "?".to_string(), |p| p.to_string())
            );
            println!(
                "   year {}, {} km",
                comp.year.map_or_else(|| "?".to_string(), |y| y.to_string()),
                comp.mileage_km
                    .map_or_else(|| "?".to_string(), |m| m.to_string()),
            );
            println!("   {}", comp.url);
        }
    }
}
