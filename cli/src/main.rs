mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{cmd_categorize, cmd_food_list, cmd_import};
use crate::config::Config;
use nutrimport_core::db::Database;
use nutrimport_core::models::{DEFAULT_BATCH_SIZE, ImportOptions, NUTTAB_BRAND};

#[derive(Parser)]
#[command(
    name = "nutrimport",
    version,
    about = "Import nutrient spreadsheets into a foods database"
)]
struct Cli {
    /// Path to the foods database (default: per-user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import foods from a spreadsheet (.xlsx, .xls or .csv)
    Import {
        /// Spreadsheet to read; only the first sheet is used
        file: PathBuf,
        /// Brand recorded for rows without a brand column
        #[arg(long, default_value = NUTTAB_BRAND)]
        brand: String,
        /// Identifier of the user running the import
        #[arg(long)]
        created_by: Option<String>,
        /// Foods written per transaction
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Show what would be imported without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which category a food would be filed under
    Categorize {
        /// Food name
        text: String,
        /// Food group / category cell, checked before the name
        #[arg(short, long)]
        group: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored foods
    Foods {
        /// Filter by name or brand
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP server with the upload endpoint
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Categorizing needs no database.
    if let Commands::Categorize { text, group, json } = &cli.command {
        return cmd_categorize(text, group.as_deref(), *json);
    }

    let config = Config::load(cli.db)?;
    let mut db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Import {
            file,
            brand,
            created_by,
            batch_size,
            dry_run,
            json,
        } => {
            let options = ImportOptions {
                default_brand: brand,
                batch_size,
                created_by,
            };
            cmd_import(&mut db, &file, &options, dry_run, json)
        }
        Commands::Foods { search, json } => cmd_food_list(&db, search.as_deref(), json),
        Commands::Serve { port, bind } => server::start_server(db, port, &bind).await,
        Commands::Categorize { .. } => Ok(()),
    }
}
