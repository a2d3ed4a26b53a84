use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{FetchError, InsertError, MetricsCallback, TableStore};
use crate::config::DatabaseConfig;
use crate::record::{EnvironmentalReading, EnvironmentalRecord, FulfillmentRecord};

/// Table store behind a bearer-token REST endpoint.
///
/// Tables are addressed as `<url>/<table>`. Reads select every column of
/// every row; inserts post a single JSON object.
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    environmental_table: String,
    fulfillment_table: String,
    metrics: Option<MetricsCallback>,
}

impl RestStore {
    /// Create a new store client from database settings.
    pub fn new(cfg: &DatabaseConfig) -> Result<Self> {
        let timeout = if cfg.timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            cfg.timeout
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            environmental_table: cfg.environmental_table.clone(),
            fulfillment_table: cfg.fulfillment_table.clone(),
            metrics: None,
        })
    }

    /// Set a metrics callback for recording request stats.
    /// The callback receives (table, status, duration).
    pub fn with_metrics(mut self, cb: MetricsCallback) -> Self {
        self.metrics = Some(cb);
        self
    }

    fn record_request(&self, table: &str, status: &str, duration: Duration) {
        if let Some(ref cb) = self.metrics {
            cb(table, status, duration);
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Select every row of `table`. An empty table is an error.
    pub async fn fetch_table<T: DeserializeOwned>(
        &self,
        table: &str,
    ) -> Result<Vec<T>, FetchError> {
        let start = Instant::now();

        let response = self
            .authorized(self.http.get(self.table_url(table)))
            .query(&[("select", "*")])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| {
                self.record_request(table, "error", start.elapsed());
                FetchError::Request {
                    table: table.to_string(),
                    source,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.record_request(table, "error", start.elapsed());
            return Err(FetchError::UnexpectedStatus {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|source| {
            self.record_request(table, "error", start.elapsed());
            FetchError::Request {
                table: table.to_string(),
                source,
            }
        })?;

        let rows: Vec<T> = serde_json::from_slice(&bytes).map_err(|source| {
            self.record_request(table, "error", start.elapsed());
            FetchError::Decode {
                table: table.to_string(),
                source,
            }
        })?;

        if rows.is_empty() {
            self.record_request(table, "empty", start.elapsed());
            return Err(FetchError::EmptyTable {
                table: table.to_string(),
            });
        }

        self.record_request(table, "success", start.elapsed());
        debug!(table, rows = rows.len(), "fetched table");

        Ok(rows)
    }
}

impl TableStore for RestStore {
    async fn insert_reading(&self, reading: EnvironmentalReading) -> Result<(), InsertError> {
        let table = self.environmental_table.as_str();
        let start = Instant::now();

        let response = match self
            .authorized(self.http.post(self.table_url(table)))
            .json(&reading)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.record_request(table, "error", start.elapsed());
                return Err(InsertError::Request(e));
            }
        };

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            self.record_request(table, "rejected", start.elapsed());
            return Err(InsertError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        self.record_request(table, "success", start.elapsed());
        Ok(())
    }

    async fn fetch_fulfillment(&self) -> Result<Vec<FulfillmentRecord>, FetchError> {
        self.fetch_table(&self.fulfillment_table).await
    }

    async fn fetch_environmental(&self) -> Result<Vec<EnvironmentalRecord>, FetchError> {
        self.fetch_table(&self.environmental_table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_config(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            api_key: "k".to_string(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_table_url_joins_base_and_table() {
        let store = RestStore::new(&db_config("https://example.test/rest/v1/")).expect("store");
        assert_eq!(
            store.table_url("order_fulfillment_data"),
            "https://example.test/rest/v1/order_fulfillment_data"
        );
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let mut cfg = db_config("https://example.test");
        cfg.timeout = Duration::ZERO;
        assert!(RestStore::new(&cfg).is_ok());
    }

    #[test]
    fn test_metrics_callback_receives_table_and_status() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let store = RestStore::new(&db_config("https://example.test"))
            .expect("store")
            .with_metrics(Box::new(move |table, status, _| {
                sink.lock()
                    .expect("lock")
                    .push((table.to_string(), status.to_string()));
            }));

        store.record_request("t", "success", Duration::from_millis(3));
        assert_eq!(
            *seen.lock().expect("lock"),
            vec![("t".to_string(), "success".to_string())]
        );
    }
}
