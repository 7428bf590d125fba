use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use beacon::config::{Config, DatabaseBackend};
use beacon::privacy::PRIVACY_MODE_SETTING;
use beacon::storage::{PostgresStorage, SqliteStorage, Storage};
use beacon::tasks::prune_expired;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "beacon-admin")]
#[command(about = "Beacon collector management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the persisted privacy mode (IP hashing)
    Privacy {
        #[command(subcommand)]
        action: PrivacyAction,
    },
    /// List the most recently seen company leads
    Leads {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Delete sessions and events older than the given number of days
    Prune {
        #[arg(long)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum PrivacyAction {
    On,
    Off,
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::Privacy { action } => match action {
            PrivacyAction::On | PrivacyAction::Off => {
                let enabled = matches!(action, PrivacyAction::On);
                storage
                    .set_setting(PRIVACY_MODE_SETTING, if enabled { "true" } else { "false" })
                    .await
                    .context("Failed to store privacy mode")?;
                println!(
                    "✓ Privacy mode {} (running collectors pick this up within {}s)",
                    if enabled { "enabled" } else { "disabled" },
                    config.privacy.cache_ttl_secs
                );
            }
            PrivacyAction::Status => match storage.get_setting(PRIVACY_MODE_SETTING).await? {
                Some(value) => println!("Privacy mode setting: {}", value),
                None => println!(
                    "Privacy mode not set, environment default: {}",
                    config.privacy.env_default
                ),
            },
        },
        Commands::Leads { limit } => {
            let leads = storage.list_leads(limit).await?;
            if leads.is_empty() {
                println!("No leads found.");
            } else {
                println!("{:<40} {:<30} {:>8}", "Company", "Domain", "Visits");
                println!("{}", "-".repeat(80));
                for lead in leads {
                    println!(
                        "{:<40} {:<30} {:>8}",
                        lead.company_name,
                        lead.domain.as_deref().unwrap_or("-"),
                        lead.visit_count
                    );
                }
            }
        }
        Commands::Prune { days } => {
            let now = chrono::Utc::now().timestamp();
            let report = prune_expired(storage.as_ref(), days, now).await?;
            println!(
                "✓ Pruned {} sessions and {} events older than {} days",
                report.sessions, report.events, days
            );
        }
    }

    Ok(())
}
