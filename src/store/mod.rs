//! Remote table store access.
//!
//! The collector inserts one [`EnvironmentalReading`] per iteration; the
//! dashboard reads both tables in full. [`rest::RestStore`] talks to the
//! hosted REST endpoint.

#[cfg(test)]
pub(crate) mod memory;
pub mod rest;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::record::{EnvironmentalReading, EnvironmentalRecord, FulfillmentRecord};

/// Callback type for recording store request metrics.
/// Receives (table, status, duration).
pub type MetricsCallback = Box<dyn Fn(&str, &str, Duration) + Send + Sync>;

/// Errors reading a full table.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("requesting table {table}: {source}")]
    Request {
        table: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} reading table {table}: {body}")]
    UnexpectedStatus {
        table: String,
        status: u16,
        body: String,
    },

    #[error("decoding rows of table {table}: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("table {table} returned no rows")]
    EmptyTable { table: String },
}

/// Errors inserting a reading.
#[derive(Error, Debug)]
pub enum InsertError {
    #[error("sending insert request: {0}")]
    Request(#[from] reqwest::Error),

    /// Anything other than 201 Created.
    #[error("insert rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Remote table store.
pub trait TableStore: Send + Sync {
    /// Insert one environmental reading. Succeeds only on 201 Created.
    fn insert_reading(
        &self,
        reading: EnvironmentalReading,
    ) -> impl Future<Output = Result<(), InsertError>> + Send;

    /// Fetch every row of the fulfillment table.
    fn fetch_fulfillment(
        &self,
    ) -> impl Future<Output = Result<Vec<FulfillmentRecord>, FetchError>> + Send;

    /// Fetch every row of the environmental table.
    fn fetch_environmental(
        &self,
    ) -> impl Future<Output = Result<Vec<EnvironmentalRecord>, FetchError>> + Send;
}
