use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use territory_tracker::{
    BackupManager, DurabilityMode, TerritoryStore,
    config::AppConfig,
    core::dates::format_optional,
    import::{ImportSummary, PhotoStore, import_names_file},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "territory-tool")]
#[command(about = "Maintenance tooling for the territory tracker data directory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create territories 1..=COUNT that do not exist yet.
    Seed {
        #[arg(long)]
        count: Option<u32>,
    },
    /// Set custom names from an `id`/`custom_name` CSV file.
    ImportNames { csv: PathBuf },
    /// Link `{id}.jpg|jpeg|png` files to their territories.
    ImportPhotos {
        dir: PathBuf,
        #[arg(long)]
        create_missing: bool,
    },
    Backup,
    ListBackups,
    /// Restore the newest backup, or the one given with --name.
    Restore {
        #[arg(long)]
        name: Option<String>,
    },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    let store = Arc::new(
        TerritoryStore::open(&config.data_dir, DurabilityMode::Snapshot)
            .await
            .with_context(|| format!("Failed to open store in '{}'", config.data_dir.display()))?,
    );
    let backups = BackupManager::new(store.clone(), &config.backup_dir, config.backup_retain);

    match cli.command {
        Command::Seed { count } => {
            let count = count.unwrap_or(config.territory_count);
            let created = store.seed(count).await.context("Seeding failed")?;
            println!("Created {} of {} territories", created, count);
        }
        Command::ImportNames { csv } => {
            let backup = backups
                .create_backup()
                .await
                .context("Backup before import failed")?;
            println!("Backup written to {}", backup.display());

            let summary = import_names_file(&store, &csv)
                .await
                .with_context(|| format!("Failed to import '{}'", csv.display()))?;
            print_summary("Names", &summary);
        }
        Command::ImportPhotos {
            dir,
            create_missing,
        } => {
            let photos = PhotoStore::new(&config.uploads_dir);
            let summary = photos
                .import_dir(&store, &dir, create_missing)
                .await
                .with_context(|| format!("Failed to import photos from '{}'", dir.display()))?;
            print_summary("Photos", &summary);
        }
        Command::Backup => {
            let path = backups.create_backup().await.context("Backup failed")?;
            println!("Backup written to {}", path.display());
        }
        Command::ListBackups => {
            let list = backups.list_backups().await.context("Listing backups failed")?;
            if list.is_empty() {
                println!("No backups in {}", backups.backup_dir().display());
            }
            for backup in list.iter().rev() {
                println!("{:<40} {:>10} bytes", backup.name, backup.size_bytes);
            }
        }
        Command::Restore { name } => {
            let restored = match name {
                Some(name) => Some(backups.restore_named(&name).await?),
                None => backups.restore_latest().await?,
            };
            match restored {
                Some(path) => println!("Restored from {}", path.display()),
                None => println!("No backups in {}", backups.backup_dir().display()),
            }
        }
        Command::List => {
            for territory in store.list_territories().await {
                println!(
                    "{:>4}  {:<30} {:<9} {:<20} {:<10} {:<10}",
                    territory.id.get(),
                    territory.display_name(),
                    if territory.is_assigned() { "assigned" } else { "free" },
                    territory.assignee,
                    format_optional(territory.date_taken),
                    format_optional(territory.date_due),
                );
            }
        }
    }

    Ok(())
}

fn print_summary(label: &str, summary: &ImportSummary) {
    println!(
        "{}: {} created, {} updated, {} unchanged, {} skipped",
        label,
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.skipped.len()
    );
    for skipped in &summary.skipped {
        println!("  skipped {}: {}", skipped.source, skipped.reason);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
