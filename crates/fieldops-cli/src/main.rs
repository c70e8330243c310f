use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use fieldops_core::{
    compute_progress, filter_entities, Collection, Customer, Document, Employee, Equipment, Job,
    Searchable, Task, ALL_CATEGORIES,
};
use fieldops_storage::{import_seed, list_scoped, JsonDocumentStore, SeedData};
use fieldops_web::AppConfig;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "fieldops")]
#[command(about = "FieldOps small-business dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web dashboard.
    Serve,
    /// Replace every collection in the data directory with a YAML seed file.
    Seed {
        #[arg(long, default_value = "fixtures/seed.yaml")]
        file: PathBuf,
    },
    /// Print progress for a date range.
    Progress {
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        /// Defaults to the current time.
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Search a collection, printing matches with [brackets] around hits.
    Search {
        collection: Collection,
        #[arg(long, short, default_value = "")]
        query: String,
        #[arg(long, short, default_value = ALL_CATEGORIES)]
        category: String,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => fieldops_web::serve(config).await?,
        Commands::Seed { file } => {
            let seed = SeedData::from_yaml_file(&file)
                .await
                .with_context(|| format!("reading seed file {}", file.display()))?;
            let store = JsonDocumentStore::new(&config.data_dir);
            for stored in import_seed(&store, &seed).await? {
                info!(
                    collection = %stored.collection,
                    documents = stored.document_count,
                    unchanged = stored.unchanged,
                    data_dir = %store.root().display(),
                    "seeded collection"
                );
                println!(
                    "seeded {}: documents={} bytes={} sha256={}{}",
                    stored.collection,
                    stored.document_count,
                    stored.byte_size,
                    stored.content_hash,
                    if stored.unchanged { " (unchanged)" } else { "" }
                );
            }
        }
        Commands::Progress { start, end, now } => {
            let now = now.unwrap_or_else(Utc::now);
            let result = compute_progress(
                start.map(|d| d.timestamp_millis()),
                end.map(|d| d.timestamp_millis()),
                now.timestamp_millis(),
            );
            println!(
                "progress={:.1}% elapsed_days={} days_left={}",
                result.progress_percentage, result.elapsed_days, result.days_left
            );
        }
        Commands::Search {
            collection,
            query,
            category,
        } => {
            let store = JsonDocumentStore::new(&config.data_dir);
            let scope = config.company_id;
            let lines = match collection {
                Collection::Customers => {
                    search_lines(&list_scoped::<Customer>(&store, scope).await?, &query, &category)
                }
                Collection::Employees => {
                    search_lines(&list_scoped::<Employee>(&store, scope).await?, &query, &category)
                }
                Collection::Equipment => {
                    search_lines(&list_scoped::<Equipment>(&store, scope).await?, &query, &category)
                }
                Collection::Jobs => {
                    search_lines(&list_scoped::<Job>(&store, scope).await?, &query, &category)
                }
                Collection::Tasks => {
                    search_lines(&list_scoped::<Task>(&store, scope).await?, &query, &category)
                }
            };
            info!(%collection, %category, matches = lines.len(), "search complete");
            if lines.is_empty() {
                println!("no matches");
            }
            for line in lines {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn search_lines<T: Document + Searchable>(items: &[T], query: &str, category: &str) -> Vec<String> {
    let fields = T::COLLECTION.search_fields();
    filter_entities(items, query, category, fields)
        .iter()
        .map(|m| {
            fields
                .iter()
                .filter_map(|field| {
                    let value = match m.highlight(field) {
                        Some(text) => text.to_markup_with("[", "]"),
                        None => m.entity.field(field)?.into_owned(),
                    };
                    Some(format!("{field}={value}"))
                })
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect()
}
