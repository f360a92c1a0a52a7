//! # ietrack common library
//!
//! Shared code for the independent-expenditure tracker:
//! - Error taxonomy
//! - Configuration resolution
//! - Database initialization and schema
//! - Domain models (transactions, filings, committees)
//! - Business-date helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{DateField, SupportOrOppose, Transaction};
