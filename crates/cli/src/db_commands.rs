use std::path::PathBuf;

use clap::Subcommand;

use crate::load_config;

#[derive(Subcommand)]
pub enum DbAction {
    /// Run all pending database migrations.
    Migrate,
    /// Clear all runtime data but keep the schema intact.
    Clear,
}

/// Child tables first; decisions and actions reference receipts and threads.
const TABLES: &[&str] = &[
    "delivery_attempts",
    "outbox_actions",
    "policy_decisions",
    "threads",
    "event_receipts",
];

pub async fn handle_db(action: DbAction, config_path: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let pool = sqlx::SqlitePool::connect(&config.database.url).await?;
    let result = match action {
        DbAction::Migrate => migrate(&pool).await,
        DbAction::Clear => clear(&pool).await,
    };
    pool.close().await;
    result
}

async fn migrate(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    println!("Running migrations...");
    courier_runtime::run_migrations(pool)
        .await
        .map_err(|e| anyhow::anyhow!("runtime migrations failed: {e}"))?;
    println!("All migrations complete.");
    Ok(())
}

async fn clear(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    for table in TABLES {
        let query = format!("DELETE FROM {table}");
        if let Err(e) = sqlx::query(&query).execute(pool).await {
            // Table might not exist if migrations haven't run
            eprintln!("Warning: could not clear {table}: {e}");
        } else {
            println!("Cleared table: {table}");
        }
    }
    Ok(())
}
