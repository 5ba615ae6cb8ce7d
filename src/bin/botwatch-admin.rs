use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use botwatch::config::Config;
use botwatch::dashboard::FilterParams;
use botwatch::detection::{registry, Classifier};
use botwatch::export::{export_visits, write_file, ExportError};
use botwatch::models::BotCategory;
use botwatch::storage;

#[derive(Parser)]
#[command(name = "botwatch-admin")]
#[command(about = "Botwatch operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every bot visit matching the filters to a CSV file
    Export {
        /// Destination file; written only once the CSV is complete
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Mark every visit from an IP as blocked
    Block { ip: String },
    /// Clear the blocked flag on every visit from an IP
    Unblock { ip: String },
    /// Assign a category (unknown, good, bad, monitored) to every visit from an IP
    Categorize { ip: String, category: String },
    /// Show which registry entry a User-Agent matches
    Classify { user_agent: String },
}

/// Same filters as the dashboard; `all` disables a flag or category filter
#[derive(Args, Default)]
struct FilterArgs {
    #[arg(long)]
    bot_name: Option<String>,
    #[arg(long)]
    ip: Option<String>,
    #[arg(long)]
    url: Option<String>,
    /// YYYY-MM-DD or RFC 3339
    #[arg(long)]
    start_date: Option<String>,
    /// YYYY-MM-DD (inclusive, end of day) or RFC 3339
    #[arg(long)]
    end_date: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    min_anomaly_score: Option<String>,
    #[arg(long)]
    max_anomaly_score: Option<String>,
    #[arg(long)]
    is_anomaly: Option<String>,
    #[arg(long)]
    is_blocked: Option<String>,
    #[arg(long)]
    os: Option<String>,
    #[arg(long)]
    browser: Option<String>,
    #[arg(long)]
    bot_category: Option<String>,
}

impl From<FilterArgs> for FilterParams {
    fn from(args: FilterArgs) -> Self {
        FilterParams {
            bot_name: args.bot_name,
            ip: args.ip,
            url: args.url,
            start_date: args.start_date,
            end_date: args.end_date,
            country: args.country,
            city: args.city,
            min_anomaly_score: args.min_anomaly_score,
            max_anomaly_score: args.max_anomaly_score,
            is_anomaly: args.is_anomaly,
            is_blocked: args.is_blocked,
            os: args.os,
            browser: args.browser,
            bot_category: args.bot_category,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        // Classification needs no database
        Commands::Classify { user_agent } => print_classification(&config, &user_agent),
        command => run_with_storage(command, &config).await?,
    }

    Ok(())
}

fn print_classification(config: &Config, user_agent: &str) {
    let classifier = Classifier::new(registry::from_config(&config.tracking).into());
    match classifier.classify(Some(user_agent)).bot_name {
        Some(name) => println!("✓ Matches '{}'", name),
        None => println!("No registry entry matches this User-Agent"),
    }
}

async fn run_with_storage(command: Commands, config: &Config) -> Result<()> {
    let storage = storage::connect(&config.database).await?;
    storage.init().await?;

    match command {
        Commands::Export { out, filters } => {
            let filter = FilterParams::from(filters)
                .to_filter()
                .context("invalid filter")?;

            match export_visits(storage.as_ref(), &filter).await {
                Ok((document, rows)) => {
                    write_file(&out, &document)
                        .with_context(|| format!("failed to write {}", out.display()))?;
                    println!("✓ Exported {} visits to {}", rows, out.display());
                }
                Err(ExportError::Empty) => {
                    println!("⚠ No visits match the given filters, nothing written");
                }
                Err(e) => return Err(e).context("export failed"),
            }
        }
        Commands::Block { ip } => {
            let updated = storage.set_blocked(&ip, true).await?;
            println!("✓ Blocked {} ({} visits updated)", ip, updated);
        }
        Commands::Unblock { ip } => {
            let updated = storage.set_blocked(&ip, false).await?;
            println!("✓ Unblocked {} ({} visits updated)", ip, updated);
        }
        Commands::Categorize { ip, category } => {
            let category = category
                .parse::<BotCategory>()
                .map_err(anyhow::Error::msg)?;
            let updated = storage.set_category(&ip, category).await?;
            println!(
                "✓ Categorized {} as {} ({} visits updated)",
                ip, category, updated
            );
        }
        Commands::Classify { user_agent } => print_classification(config, &user_agent),
    }

    Ok(())
}
