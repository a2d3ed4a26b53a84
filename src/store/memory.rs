use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{FetchError, InsertError, TableStore};
use crate::record::{EnvironmentalReading, EnvironmentalRecord, FulfillmentRecord};

const ENVIRONMENTAL_TABLE: &str = "shipdock_environmental_data";
const FULFILLMENT_TABLE: &str = "order_fulfillment_data";

/// In-process table store.
///
/// Inserts are stamped with the current time and appended to the
/// environmental table. Insert outcomes can be scripted with
/// [`MemoryStore::reject_next`].
#[derive(Default)]
pub struct MemoryStore {
    environmental: Mutex<Vec<EnvironmentalRecord>>,
    fulfillment: Mutex<Vec<FulfillmentRecord>>,
    inserted: Mutex<Vec<EnvironmentalReading>>,
    rejections: Mutex<VecDeque<u16>>,
    fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new(
        fulfillment: Vec<FulfillmentRecord>,
        environmental: Vec<EnvironmentalRecord>,
    ) -> Self {
        Self {
            environmental: Mutex::new(environmental),
            fulfillment: Mutex::new(fulfillment),
            ..Self::default()
        }
    }

    /// Makes the next insert fail with the given HTTP status.
    pub fn reject_next(&self, status: u16) {
        self.rejections.lock().push_back(status);
    }

    /// Appends a row to the environmental table.
    pub fn push_environmental(&self, record: EnvironmentalRecord) {
        self.environmental.lock().push(record);
    }

    /// Appends a row to the fulfillment table.
    pub fn push_fulfillment(&self, record: FulfillmentRecord) {
        self.fulfillment.lock().push(record);
    }

    /// Readings accepted so far, in insert order.
    pub fn inserted(&self) -> Vec<EnvironmentalReading> {
        self.inserted.lock().clone()
    }

    /// Number of full-table reads served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn stamp(reading: EnvironmentalReading, at: DateTime<Utc>) -> EnvironmentalRecord {
        EnvironmentalRecord {
            timestamp: at,
            noise_level: reading.noise_level,
            temperature: f64::from(reading.temperature),
        }
    }
}

fn non_empty<T: Clone>(rows: &[T], table: &str) -> Result<Vec<T>, FetchError> {
    if rows.is_empty() {
        return Err(FetchError::EmptyTable {
            table: table.to_string(),
        });
    }
    Ok(rows.to_vec())
}

impl TableStore for MemoryStore {
    async fn insert_reading(&self, reading: EnvironmentalReading) -> Result<(), InsertError> {
        if let Some(status) = self.rejections.lock().pop_front() {
            return Err(InsertError::Rejected {
                status,
                body: "rejected".to_string(),
            });
        }

        self.inserted.lock().push(reading);
        self.environmental
            .lock()
            .push(Self::stamp(reading, Utc::now()));
        Ok(())
    }

    async fn fetch_fulfillment(&self) -> Result<Vec<FulfillmentRecord>, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        non_empty(&self.fulfillment.lock(), FULFILLMENT_TABLE)
    }

    async fn fetch_environmental(&self) -> Result<Vec<EnvironmentalRecord>, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        non_empty(&self.environmental.lock(), ENVIRONMENTAL_TABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_insert_then_fetch() {
        let store = MemoryStore::default();
        store
            .insert_reading(EnvironmentalReading {
                noise_level: 42.0,
                temperature: 71,
            })
            .await
            .expect("insert");

        let rows = store.fetch_environmental().await.expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 71.0);
        assert_eq!(store.inserted().len(), 1);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_empty_table_is_error() {
        let store = MemoryStore::default();
        let err = store.fetch_fulfillment().await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyTable { ref table } if table == FULFILLMENT_TABLE));
    }

    #[tokio::test]
    async fn test_memory_store_scripted_rejection() {
        let store = MemoryStore::default();
        store.reject_next(500);

        let reading = EnvironmentalReading {
            noise_level: 30.0,
            temperature: 65,
        };
        let err = store.insert_reading(reading).await.unwrap_err();
        assert!(matches!(err, InsertError::Rejected { status: 500, .. }));

        store.insert_reading(reading).await.expect("second insert");
        assert_eq!(store.inserted(), vec![reading]);
    }
}
