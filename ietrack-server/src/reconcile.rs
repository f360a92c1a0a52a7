//! Date/field reconciliation
//!
//! No single date column is canonical, so callers pick which sources to
//! consult. Each source yields its own labeled result set; stored sources
//! share the canonical ordering, live sources are sorted here to match.

use crate::client::{ApiError, Endpoint, Upstream};
use crate::export::{Cell, Table};
use crate::store::{RecordQuery, RecordStore};
use chrono::NaiveDate;
use ietrack_common::models::parse_date_prefix;
use ietrack_common::{DateField, Error, Transaction};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;
use tracing::{debug, warn};

/// Columns shown in HTML listings
pub const DISPLAY_COLUMNS: [&str; 11] = [
    "fec_committee_name",
    "candidate_name",
    "office",
    "state",
    "district",
    "amount",
    "date",
    "purpose",
    "payee",
    "date_received",
    "support_or_oppose",
];

/// Columns carried by notifications and data exports
pub const DATA_COLUMNS: [&str; 14] = [
    "fec_committee_id",
    "fec_committee_name",
    "candidate_name",
    "office",
    "state",
    "district",
    "amount",
    "date",
    "purpose",
    "payee",
    "date_received",
    "support_or_oppose",
    "dissemination_date",
    "unique_id",
];

/// Committee page on the regulator's site
pub const COMMITTEE_URL_TEMPLATE: &str = "https://www.fec.gov/data/committee/{}/";

/// Columns whose value is itself a URL
const SELF_LINK_COLUMNS: [&str; 3] = ["fec_uri", "expenditures_link", "transactions_link"];

/// Failure while loading a result set
#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error(transparent)]
    Upstream(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] Error),
}

/// One data source for a date query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Live feed for the date
    Api,
    /// Stored rows whose given date column equals the date
    Stored(DateField),
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Api,
        Category::Stored(DateField::Date),
        Category::Stored(DateField::DateReceived),
        Category::Stored(DateField::DisseminationDate),
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Api => "api",
            Category::Stored(field) => field.column(),
        }
    }

    /// Comma-separated list; blank means every category
    ///
    /// Order is preserved and repeats are dropped.
    pub fn parse_list(raw: Option<&str>) -> Result<Vec<Category>, String> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Category::ALL.to_vec()),
            Some(r) => r,
        };

        let mut categories = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let category: Category = part.parse()?;
            if !categories.contains(&category) {
                categories.push(category);
            }
        }

        if categories.is_empty() {
            return Err("no categories given".to_string());
        }
        Ok(categories)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "api" => Ok(Category::Api),
            other => other
                .parse::<DateField>()
                .map(Category::Stored)
                .map_err(|_| format!("unknown category: {:?}", other)),
        }
    }
}

/// What to show when a date-scoped listing is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Most-recent row count
    pub rows: u32,
    /// Trailing received-date window; 0 disables it
    pub days: u32,
}

/// Listing rows plus whether they came from the fallback
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub records: Vec<Transaction>,
    pub fell_back: bool,
}

/// Stored rows for `primary`, or the fallback rows when it is empty
pub async fn load_with_fallback(
    store: &dyn RecordStore,
    primary: RecordQuery,
    today: NaiveDate,
    policy: FallbackPolicy,
) -> Result<Listing, Error> {
    let records = store.query(&primary).await?;
    if !records.is_empty() {
        return Ok(Listing {
            records,
            fell_back: false,
        });
    }

    let records = fallback_records(store, today, policy).await?;
    debug!(rows = records.len(), "Primary listing empty, using fallback rows");
    Ok(Listing {
        records,
        fell_back: true,
    })
}

/// Received window first (when enabled), then the newest `policy.rows`
pub async fn fallback_records(
    store: &dyn RecordStore,
    today: NaiveDate,
    policy: FallbackPolicy,
) -> Result<Vec<Transaction>, Error> {
    if policy.days > 0 {
        let windowed = store
            .query(&RecordQuery::ReceivedWithin {
                today,
                days: policy.days,
            })
            .await?;
        if !windowed.is_empty() {
            return Ok(windowed);
        }
    }

    store
        .query(&RecordQuery::MostRecent { limit: policy.rows })
        .await
}

/// Raw records for one category
pub async fn query_category(
    store: &dyn RecordStore,
    upstream: &dyn Upstream,
    category: Category,
    date: NaiveDate,
) -> Result<Vec<Value>, QueryError> {
    match category {
        Category::Api => {
            let mut values = upstream
                .fetch_all(&Endpoint::IndependentExpenditures(date))
                .await?;
            sort_values(&mut values);
            Ok(values)
        }
        Category::Stored(field) => {
            let records = store.query(&RecordQuery::OnDate { field, date }).await?;
            Ok(to_values(&records))
        }
    }
}

/// One labeled table per category, in the order given
///
/// Tables are not shaped; the caller picks display or data columns.
pub async fn query_by_categories(
    store: &dyn RecordStore,
    upstream: &dyn Upstream,
    categories: &[Category],
    date: NaiveDate,
) -> Result<Vec<(String, Table)>, QueryError> {
    let mut labeled = Vec::with_capacity(categories.len());
    for category in categories {
        let values = query_category(store, upstream, *category, date).await?;
        debug!(category = %category, %date, rows = values.len(), "Loaded category");
        labeled.push((category.label().to_string(), Table::from_records(&values)));
    }
    Ok(labeled)
}

/// Typed records as JSON objects with every field present
pub fn to_values(records: &[Transaction]) -> Vec<Value> {
    records
        .iter()
        .filter_map(|r| serde_json::to_value(r).ok())
        .collect()
}

fn date_key(value: &Value, column: &str) -> Option<NaiveDate> {
    value.get(column).and_then(Value::as_str).and_then(parse_date_prefix)
}

fn compare_desc(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Canonical order for raw records: `date` desc, then `date_received` desc
///
/// Records without a date sort last; ties keep their upstream order.
pub fn sort_values(values: &mut [Value]) {
    values.sort_by(|a, b| {
        compare_desc(date_key(a, "date"), date_key(b, "date")).then_with(|| {
            compare_desc(date_key(a, "date_received"), date_key(b, "date_received"))
        })
    });
}

/// Keep `columns` in the given order, skipping any the table lacks
///
/// A table that has none of them is returned unshaped. An empty table with
/// no columns at all takes `columns` as its header.
pub fn shape(table: Table, columns: &[&str]) -> Table {
    if table.columns.is_empty() && table.rows.is_empty() {
        return Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        };
    }

    let indexes: Vec<(usize, &str)> = columns
        .iter()
        .filter_map(|c| table.column_index(c).map(|i| (i, *c)))
        .collect();

    if indexes.is_empty() {
        warn!(
            available = ?table.columns,
            "None of the requested columns present, passing table through"
        );
        return table;
    }

    if indexes.len() < columns.len() {
        debug!(
            kept = indexes.len(),
            requested = columns.len(),
            "Some requested columns missing"
        );
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            indexes
                .iter()
                .map(|(i, _)| row.get(*i).cloned().unwrap_or(Cell::Empty))
                .collect()
        })
        .collect();

    Table {
        columns: indexes.iter().map(|(_, c)| c.to_string()).collect(),
        rows,
    }
}

/// Turn known id/URL columns into links; empty cells stay plain
pub fn linkify(mut table: Table) -> Table {
    let committee = table.column_index("fec_committee_id");
    let self_links: Vec<usize> = SELF_LINK_COLUMNS
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    for row in &mut table.rows {
        if let Some(i) = committee {
            if let Some(Cell::Text(id)) = row.get(i).cloned() {
                row[i] = Cell::Link {
                    href: COMMITTEE_URL_TEMPLATE.replace("{}", &id),
                    text: id,
                };
            }
        }
        for &i in &self_links {
            if let Some(Cell::Text(url)) = row.get(i).cloned() {
                row[i] = Cell::Link {
                    href: url.clone(),
                    text: url,
                };
            }
        }
    }

    table
}
