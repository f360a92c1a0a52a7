//! Database initialization
//!
//! One append-only table of independent-expenditure transactions. Schema
//! creation is idempotent and runs on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// The only table the application writes
pub const TRANSACTIONS_TABLE: &str = "ie_transactions";

/// Stored columns, in insert/select order
pub const TRANSACTION_COLUMNS: [&str; 18] = [
    "unique_id",
    "fec_committee_id",
    "fec_committee_name",
    "candidate_name",
    "office",
    "state",
    "district",
    "amount",
    "date",
    "date_received",
    "dissemination_date",
    "purpose",
    "payee",
    "support_or_oppose",
    "transaction_id",
    "expenditures_link",
    "transactions_link",
    "fec_uri",
];

/// Open (creating if needed) the database file and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the listing handlers read while a sync run writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_transactions_table(&pool).await?;

    Ok(pool)
}

/// In-memory database with the schema applied
///
/// Limited to a single connection: every SQLite memory connection is its own
/// database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_transactions_table(&pool).await?;
    Ok(pool)
}

/// Create the transactions table and its date indexes
pub async fn create_transactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ie_transactions (
            unique_id TEXT NOT NULL UNIQUE,
            fec_committee_id TEXT,
            fec_committee_name TEXT,
            candidate_name TEXT,
            office TEXT,
            state TEXT,
            district TEXT,
            amount TEXT,
            date TEXT,
            date_received TEXT,
            dissemination_date TEXT,
            purpose TEXT,
            payee TEXT,
            support_or_oppose TEXT,
            transaction_id TEXT,
            expenditures_link TEXT,
            transactions_link TEXT,
            fec_uri TEXT,
            inserted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    for column in ["date", "date_received", "dissemination_date"] {
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{col} ON {table} ({col})",
            table = TRANSACTIONS_TABLE,
            col = column
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    Ok(())
}
