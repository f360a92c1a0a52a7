//! Domain models
//!
//! Upstream records are loosely typed (ids arrive as numbers or strings, dates
//! as empty strings, timestamps or plain dates), so deserialization here is
//! deliberately lenient and normalizes everything into one shape.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Whether an expenditure supports or opposes its candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportOrOppose {
    Support,
    Oppose,
}

impl SupportOrOppose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportOrOppose::Support => "support",
            SupportOrOppose::Oppose => "oppose",
        }
    }
}

impl fmt::Display for SupportOrOppose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupportOrOppose {
    type Err = String;

    /// Accepts the API's single-letter codes as well as the spelled-out forms
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "support" | "supports" => Ok(SupportOrOppose::Support),
            "o" | "oppose" | "opposes" => Ok(SupportOrOppose::Oppose),
            other => Err(format!("unknown support/oppose code: {:?}", other)),
        }
    }
}

impl Serialize for SupportOrOppose {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SupportOrOppose {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The three stored date columns
///
/// None of them is authoritative across all record sources, so queries name
/// the column explicitly. Column names only ever come from this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateField {
    /// Nominal transaction date reported by the API
    Date,
    /// Date the filer's report was received
    DateReceived,
    /// Date the regulator made the record public
    DisseminationDate,
}

impl DateField {
    pub const ALL: [DateField; 3] = [
        DateField::Date,
        DateField::DateReceived,
        DateField::DisseminationDate,
    ];

    /// SQL column name
    pub fn column(&self) -> &'static str {
        match self {
            DateField::Date => "date",
            DateField::DateReceived => "date_received",
            DateField::DisseminationDate => "dissemination_date",
        }
    }
}

impl FromStr for DateField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateField::ALL
            .into_iter()
            .find(|f| f.column() == s.trim())
            .ok_or_else(|| format!("unknown date field: {:?}", s))
    }
}

/// One independent-expenditure disclosure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Transaction {
    #[serde(deserialize_with = "required_string")]
    pub unique_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub fec_committee_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub fec_committee_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub candidate_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub office: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub district: Option<String>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub amount: Option<Decimal>,
    #[serde(deserialize_with = "lenient_date")]
    pub date: Option<NaiveDate>,
    #[serde(deserialize_with = "lenient_date")]
    pub date_received: Option<NaiveDate>,
    #[serde(deserialize_with = "lenient_date")]
    pub dissemination_date: Option<NaiveDate>,
    #[serde(deserialize_with = "lenient_string")]
    pub purpose: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub payee: Option<String>,
    #[serde(deserialize_with = "lenient_support")]
    pub support_or_oppose: Option<SupportOrOppose>,
    #[serde(deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub expenditures_link: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub transactions_link: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub fec_uri: Option<String>,
}

impl Transaction {
    /// Value of one of the three date columns
    pub fn date_of(&self, field: DateField) -> Option<NaiveDate> {
        match field {
            DateField::Date => self.date,
            DateField::DateReceived => self.date_received,
            DateField::DisseminationDate => self.dissemination_date,
        }
    }

    /// Parse one upstream JSON record
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let transaction: Transaction = serde_json::from_value(value)?;
        if transaction.unique_id.is_empty() {
            return Err(serde::de::Error::custom("record has no unique_id"));
        }
        Ok(transaction)
    }
}

/// Committee summary from `committees/<id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Committee {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub party: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub designation: Option<String>,
}

/// Expedited disclosure form kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    /// 24-hour notice (Schedule E short form)
    TwentyFour,
    /// 48-hour notice (Form 6 long form)
    FortyEight,
}

impl FormType {
    pub fn code(&self) -> &'static str {
        match self {
            FormType::TwentyFour => "24",
            FormType::FortyEight => "48",
        }
    }
}

impl Serialize for FormType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// A 24/48-hour filing scraped from its detail page; display-only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickFiling {
    pub filing_id: Option<String>,
    pub form_type: FormType,
    pub fec_committee_id: Option<String>,
    pub fec_committee_name: Option<String>,
    pub candidate_id: Option<String>,
    pub candidate_name: Option<String>,
    pub office_sought: Option<String>,
    pub expenditures_link: Option<String>,
    pub transactions_link: Option<String>,
    pub source_url: String,
}

// ---------------------------------------------------------------------------
// Lenient field deserializers
// ---------------------------------------------------------------------------

fn scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value))
}

fn required_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value).unwrap_or_default())
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    match scalar_to_string(value) {
        None => Ok(None),
        Some(raw) => parse_date_prefix(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {:?}", raw))),
    }
}

fn lenient_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    match scalar_to_string(value) {
        None => Ok(None),
        Some(raw) => Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid amount {:?}: {}", raw, e))),
    }
}

fn lenient_support<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SupportOrOppose>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    match scalar_to_string(value) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse `YYYY-MM-DD`, ignoring any time suffix (`2024-03-12T00:00:00`)
pub fn parse_date_prefix(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}
