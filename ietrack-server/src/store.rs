//! Record store: append-only persistence for transaction records
//!
//! Every statement is parameterized. The only identifiers interpolated into
//! SQL come from [`DateField::column`] and the fixed table and column constants.

use async_trait::async_trait;
use chrono::NaiveDate;
use ietrack_common::db::{TRANSACTIONS_TABLE, TRANSACTION_COLUMNS};
use ietrack_common::models::parse_date_prefix;
use ietrack_common::time::window_start;
use ietrack_common::{DateField, Error, Result, SupportOrOppose, Transaction};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info};

/// Canonical display order: later nominal date first, then later receipt
const ORDER_BY: &str = "ORDER BY date DESC, date_received DESC, unique_id ASC";

/// Which stored ids to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScope {
    All,
    OnDate(DateField, NaiveDate),
}

/// Read filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordQuery {
    /// Rows whose `field` equals `date`
    OnDate { field: DateField, date: NaiveDate },
    /// Rows received within the last `days` days up to and including `today`
    ReceivedWithin { today: NaiveDate, days: u32 },
    /// The newest `limit` rows overall
    MostRecent { limit: u32 },
}

/// Persistence boundary over the transactions table
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn existing_ids(&self, scope: IdScope) -> Result<HashSet<String>>;

    /// Insert all records atomically; returns the number inserted
    ///
    /// An empty slice is a no-op. A `unique_id` already present fails the
    /// whole batch with [`Error::Conflict`] and writes nothing.
    async fn append(&self, records: &[Transaction]) -> Result<usize>;

    /// Rows matching `query`, in canonical display order
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Transaction>>;

    /// Latest nominal transaction date stored
    async fn latest_date(&self) -> Result<Option<NaiveDate>>;
}

/// SQLite-backed record store
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn select_list() -> String {
    TRANSACTION_COLUMNS.join(", ")
}

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let text = |column: &str| -> Result<Option<String>> {
        Ok(row.try_get::<Option<String>, _>(column)?)
    };
    let date = |column: &str| -> Result<Option<NaiveDate>> {
        match text(column)? {
            None => Ok(None),
            Some(raw) => parse_date_prefix(&raw)
                .map(Some)
                .ok_or_else(|| Error::Internal(format!("stored {} is not a date: {}", column, raw))),
        }
    };

    let amount = match text("amount")? {
        None => None,
        Some(raw) => Some(
            Decimal::from_str(&raw)
                .map_err(|e| Error::Internal(format!("stored amount {:?}: {}", raw, e)))?,
        ),
    };
    let support_or_oppose = match text("support_or_oppose")? {
        None => None,
        Some(raw) => Some(raw.parse::<SupportOrOppose>().map_err(Error::Internal)?),
    };

    Ok(Transaction {
        unique_id: row.try_get("unique_id")?,
        fec_committee_id: text("fec_committee_id")?,
        fec_committee_name: text("fec_committee_name")?,
        candidate_name: text("candidate_name")?,
        office: text("office")?,
        state: text("state")?,
        district: text("district")?,
        amount,
        date: date("date")?,
        date_received: date("date_received")?,
        dissemination_date: date("dissemination_date")?,
        purpose: text("purpose")?,
        payee: text("payee")?,
        support_or_oppose,
        transaction_id: text("transaction_id")?,
        expenditures_link: text("expenditures_link")?,
        transactions_link: text("transactions_link")?,
        fec_uri: text("fec_uri")?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn existing_ids(&self, scope: IdScope) -> Result<HashSet<String>> {
        let ids: Vec<String> = match scope {
            IdScope::All => {
                let sql = format!("SELECT DISTINCT unique_id FROM {}", TRANSACTIONS_TABLE);
                sqlx::query_scalar(&sql).fetch_all(&self.pool).await?
            }
            IdScope::OnDate(field, date) => {
                let sql = format!(
                    "SELECT DISTINCT unique_id FROM {} WHERE {} = ?",
                    TRANSACTIONS_TABLE,
                    field.column()
                );
                sqlx::query_scalar(&sql)
                    .bind(date_text(Some(date)))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        debug!(count = ids.len(), ?scope, "Loaded existing ids");
        Ok(ids.into_iter().collect())
    }

    async fn append(&self, records: &[Transaction]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; TRANSACTION_COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            TRANSACTIONS_TABLE,
            select_list(),
            placeholders
        );

        let mut tx = self.pool.begin().await?;

        for record in records {
            let result = sqlx::query(&sql)
                .bind(&record.unique_id)
                .bind(&record.fec_committee_id)
                .bind(&record.fec_committee_name)
                .bind(&record.candidate_name)
                .bind(&record.office)
                .bind(&record.state)
                .bind(&record.district)
                .bind(record.amount.map(|a| a.to_string()))
                .bind(date_text(record.date))
                .bind(date_text(record.date_received))
                .bind(date_text(record.dissemination_date))
                .bind(&record.purpose)
                .bind(&record.payee)
                .bind(record.support_or_oppose.map(|s| s.as_str()))
                .bind(&record.transaction_id)
                .bind(&record.expenditures_link)
                .bind(&record.transactions_link)
                .bind(&record.fec_uri)
                .execute(&mut *tx)
                .await;

            if let Err(e) = result {
                // Dropping `tx` rolls back the rows inserted so far
                return Err(match e {
                    sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                        Error::Conflict(format!("unique_id already stored: {}", record.unique_id))
                    }
                    other => Error::Database(other),
                });
            }
        }

        tx.commit().await?;
        info!(count = records.len(), "Appended transactions");
        Ok(records.len())
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<Transaction>> {
        let rows = match *query {
            RecordQuery::OnDate { field, date } => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE {} = ? {}",
                    select_list(),
                    TRANSACTIONS_TABLE,
                    field.column(),
                    ORDER_BY
                );
                sqlx::query(&sql)
                    .bind(date_text(Some(date)))
                    .fetch_all(&self.pool)
                    .await?
            }
            RecordQuery::ReceivedWithin { today, days } => {
                let sql = format!(
                    "SELECT {} FROM {} \
                     WHERE date_received >= ? AND date_received <= ? {}",
                    select_list(),
                    TRANSACTIONS_TABLE,
                    ORDER_BY
                );
                sqlx::query(&sql)
                    .bind(date_text(Some(window_start(today, days))))
                    .bind(date_text(Some(today)))
                    .fetch_all(&self.pool)
                    .await?
            }
            RecordQuery::MostRecent { limit } => {
                let sql = format!(
                    "SELECT {} FROM {} {} LIMIT ?",
                    select_list(),
                    TRANSACTIONS_TABLE,
                    ORDER_BY
                );
                sqlx::query(&sql)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(transaction_from_row).collect()
    }

    async fn latest_date(&self) -> Result<Option<NaiveDate>> {
        let sql = format!("SELECT MAX(date) FROM {}", TRANSACTIONS_TABLE);
        let latest: Option<String> = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(latest.as_deref().and_then(parse_date_prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ietrack_common::db::init_in_memory;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn record(id: &str, date: u32, received: u32) -> Transaction {
        Transaction {
            unique_id: id.to_string(),
            fec_committee_id: Some("C00000001".into()),
            fec_committee_name: Some("Example PAC".into()),
            amount: Some(Decimal::from_str("1250.75").unwrap()),
            date: Some(day(date)),
            date_received: Some(day(received)),
            support_or_oppose: Some(SupportOrOppose::Support),
            ..Default::default()
        }
    }

    async fn store() -> SqliteRecordStore {
        SqliteRecordStore::new(init_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = store().await;
        let original = record("a", 10, 11);

        assert_eq!(store.append(std::slice::from_ref(&original)).await.unwrap(), 1);

        let rows = store
            .query(&RecordQuery::OnDate { field: DateField::Date, date: day(10) })
            .await
            .unwrap();
        assert_eq!(rows, vec![original]);
    }

    #[tokio::test]
    async fn test_append_empty_is_noop() {
        let store = store().await;
        assert_eq!(store.append(&[]).await.unwrap(), 0);
        assert!(store.existing_ids(IdScope::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rolls_back_whole_batch() {
        let store = store().await;
        store.append(&[record("a", 10, 10)]).await.unwrap();

        let result = store.append(&[record("b", 10, 10), record("a", 10, 10)]).await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        let ids = store.existing_ids(IdScope::All).await.unwrap();
        assert_eq!(ids, HashSet::from(["a".to_string()]));
    }

    #[tokio::test]
    async fn test_existing_ids_scoped_by_date() {
        let store = store().await;
        store
            .append(&[record("a", 10, 12), record("b", 11, 12), record("c", 11, 13)])
            .await
            .unwrap();

        let on_11 = store
            .existing_ids(IdScope::OnDate(DateField::Date, day(11)))
            .await
            .unwrap();
        assert_eq!(on_11, HashSet::from(["b".to_string(), "c".to_string()]));

        let received_12 = store
            .existing_ids(IdScope::OnDate(DateField::DateReceived, day(12)))
            .await
            .unwrap();
        assert_eq!(received_12.len(), 2);
    }

    #[tokio::test]
    async fn test_most_recent_ordering() {
        let store = store().await;
        store
            .append(&[
                record("old", 1, 2),
                record("tie-early", 5, 6),
                record("newest", 9, 9),
                record("tie-late", 5, 8),
            ])
            .await
            .unwrap();

        let rows = store.query(&RecordQuery::MostRecent { limit: 3 }).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.unique_id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "tie-late", "tie-early"]);
    }

    #[tokio::test]
    async fn test_received_within_window() {
        let store = store().await;
        store
            .append(&[record("in", 1, 9), record("edge", 1, 7), record("out", 1, 6)])
            .await
            .unwrap();

        let rows = store
            .query(&RecordQuery::ReceivedWithin { today: day(10), days: 3 })
            .await
            .unwrap();
        let mut ids: Vec<&str> = rows.iter().map(|r| r.unique_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["edge", "in"]);
    }

    #[tokio::test]
    async fn test_latest_date() {
        let store = store().await;
        assert_eq!(store.latest_date().await.unwrap(), None);

        store.append(&[record("a", 3, 3), record("b", 7, 7)]).await.unwrap();
        assert_eq!(store.latest_date().await.unwrap(), Some(day(7)));
    }
}
