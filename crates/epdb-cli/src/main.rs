mod export;
mod reconcile;
mod sheet;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "epdb-cli")]
#[command(about = "EP catalog maintenance from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Move zero-click products named in a click statistics CSV to the backup table
    Reconcile {
        /// Path to the click statistics export
        path: PathBuf,
        /// Report what would move without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare a merchant EP workbook with the active catalog
    Diff {
        /// Path to the EP xlsx file
        path: PathBuf,
    },
    /// Upsert a merchant EP workbook into the active catalog by product id
    Import {
        /// Path to the EP xlsx file
        path: PathBuf,
    },
    /// Write the full catalog (active and deleted rows) to an xlsx workbook
    Export {
        /// Output file; defaults to `ep_data_export_<date>.xlsx`
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("epdb-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = epdb_core::load_app_config()?;
    let pool_config = epdb_db::PoolConfig::from_app_config(&config);
    let pool = epdb_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            epdb_db::ping(&pool).await?;
            println!("database reachable");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = epdb_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Reconcile { path, dry_run } => {
            reconcile::run_reconcile(&pool, &path, dry_run).await?;
        }
        Commands::Diff { path } => {
            sheet::run_diff(&pool, &path).await?;
        }
        Commands::Import { path } => {
            sheet::run_import(&pool, &path).await?;
        }
        Commands::Export { out } => {
            let out = out.unwrap_or_else(export::default_output_path);
            export::run_export(&pool, &out).await?;
        }
    }

    Ok(())
}
