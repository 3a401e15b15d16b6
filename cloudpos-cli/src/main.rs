//! CloudPOS command-line tool
//!
//! Drives the offline store and sync engine against a local database file.
//!
//! Usage:
//!   cloudpos --db shop.db --config cloudpos.json sync
//!   cloudpos product add "Milk" 1.25 --stock 40

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cloudpos_cli::{CliConfig, Workspace, resolve_db_path};
use cloudpos_types::{CategoryFields, CustomerFields, EntityId, ProductFields};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cloudpos")]
#[command(about = "Offline-first POS cache and sync engine")]
struct Cli {
    /// Path to the SQLite database (default: ./cloudpos.db)
    #[arg(global = true, long)]
    db: Option<PathBuf>,

    /// JSON config file with `gateway` and `sync` sections
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database schema
    Migrate,
    /// Pending mutations and the last sync run
    Status,
    /// List pending outbox entries in push order
    Outbox,
    /// Push pending mutations, then pull remote changes
    Sync,
    /// Pre-load remote tables into the local cache
    Warm,
    /// Store offline credentials for the signed-in user
    Provision {
        /// PIN used to unlock this device offline
        #[arg(long)]
        pin: String,
    },
    /// Sign in, falling back to offline credentials
    Unlock {
        /// Email or user id
        identifier: String,
        #[arg(long)]
        pin: String,
    },
    /// Manage products
    #[command(subcommand)]
    Product(ProductCommand),
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage customers
    #[command(subcommand)]
    Customer(CustomerCommand),
}

#[derive(Subcommand, Debug)]
enum ProductCommand {
    Add(ProductArgs),
    /// Live products with their category names
    List,
}

#[derive(Args, Debug)]
struct ProductArgs {
    name: String,
    price: f64,
    #[arg(long, default_value = "0")]
    stock: i64,
    #[arg(long)]
    category: Option<EntityId>,
    #[arg(long)]
    barcode: Option<String>,
    #[arg(long)]
    sku: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum CustomerCommand {
    Add {
        name: String,
        phone: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    List,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = CliConfig::load(cli.config.as_deref())?;
    let db = resolve_db_path(cli.db);
    let workspace = Workspace::open(&db, config)?;

    match cli.command {
        Command::Migrate => {
            let version = workspace.store().schema_version()?;
            info!("{} is at schema version {}", db.display(), version);
        }
        Command::Status => {
            let status = workspace.engine()?.status().await?;
            print_json(&status)?;
        }
        Command::Outbox => {
            let entries = workspace.outbox().peek_all()?;
            print_json(&entries)?;
        }
        Command::Sync => {
            let report = workspace.engine()?.sync().await.context("Sync failed to start")?;
            if !report.ok {
                warn!("Sync finished with {} errors", report.errors.len());
            }
            print_json(&report)?;
        }
        Command::Warm => {
            let report = workspace.engine()?.warm_cache().await?;
            print_json(&report)?;
        }
        Command::Provision { pin } => {
            let profile = workspace.provision(&pin).await?;
            print_json(&profile)?;
        }
        Command::Unlock { identifier, pin } => {
            let state = workspace.unlock(&identifier, &pin).await?;
            print_json(&state)?;
        }
        Command::Product(ProductCommand::Add(args)) => {
            let mut fields = ProductFields::new(args.name, args.price, args.stock);
            fields.category_id = args.category;
            fields.barcode = args.barcode;
            fields.sku = args.sku;
            fields.description = args.description;
            print_json(&workspace.entities().create(fields)?)?;
        }
        Command::Product(ProductCommand::List) => {
            print_json(&workspace.entities().products_with_category()?)?;
        }
        Command::Category(CategoryCommand::Add { name, description }) => {
            let mut fields = CategoryFields::new(name);
            fields.description = description;
            print_json(&workspace.entities().create(fields)?)?;
        }
        Command::Category(CategoryCommand::List) => {
            print_json(&workspace.entities().list::<CategoryFields>()?)?;
        }
        Command::Customer(CustomerCommand::Add {
            name,
            phone,
            email,
            address,
        }) => {
            let mut fields = CustomerFields::new(name, phone);
            fields.email = email;
            fields.address = address;
            print_json(&workspace.entities().create(fields)?)?;
        }
        Command::Customer(CustomerCommand::List) => {
            print_json(&workspace.entities().list::<CustomerFields>()?)?;
        }
    }

    Ok(())
}
