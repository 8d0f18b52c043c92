//! Loads catalog products from a JSON file.
//!
//! Run with: cargo run --bin seed-data -- --file seed/products.json
//!
//! The file is an array of `{name, price, stock, category, image}` objects.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use storefront_api::{
    config,
    db::{self, DbConfig},
    services::catalog::{CatalogService, NewProduct},
};

#[derive(Parser)]
#[command(name = "seed-data", about = "Load storefront products from a JSON file", version)]
struct Cli {
    /// JSON file with an array of products
    #[arg(long, default_value = "seed/products.json")]
    file: PathBuf,

    /// Database URL; defaults to the application configuration
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Delete existing products before inserting
    #[arg(long)]
    replace: bool,

    /// Apply pending migrations first
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    let database_url = match cli.database_url {
        Some(url) => url,
        None => {
            config::load_config()
                .context("no --database-url given and configuration failed to load")?
                .database_url
        }
    };

    let raw = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let products: Vec<NewProduct> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid product list", cli.file.display()))?;
    info!(count = products.len(), file = %cli.file.display(), "Loaded seed products");

    let pool = db::establish_connection_with_config(&DbConfig {
        url: database_url,
        max_connections: 2,
        min_connections: 1,
        ..Default::default()
    })
    .await?;
    if cli.migrate {
        db::run_migrations(&pool).await?;
    }

    let pool = Arc::new(pool);
    let created = CatalogService::new(pool.clone())
        .import_products(products, cli.replace)
        .await?;
    info!(count = created.len(), "Seeded products");

    db::close(pool).await;
    Ok(())
}
