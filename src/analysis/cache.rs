use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::{build_package, AnalysisError, DataPackage};
use crate::store::{FetchError, TableStore};

/// Callback type for recording package loads.
/// Receives (status, duration).
pub type LoadCallback = Box<dyn Fn(&str, Duration) + Send + Sync>;

/// Errors loading a [`DataPackage`].
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Session-scoped cache of the data package.
///
/// The first access fetches both tables and builds the package; later
/// accesses return the same package even if the tables have changed since.
/// A failed load is not cached, so the next access retries.
pub struct SessionCache<S> {
    store: Arc<S>,
    package: OnceCell<Arc<DataPackage>>,
    metrics: Option<LoadCallback>,
}

impl<S: TableStore> SessionCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            package: OnceCell::new(),
            metrics: None,
        }
    }

    /// Set a metrics callback for recording loads.
    pub fn with_metrics(mut self, cb: LoadCallback) -> Self {
        self.metrics = Some(cb);
        self
    }

    /// Whether the package has been loaded in this session.
    pub fn is_loaded(&self) -> bool {
        self.package.initialized()
    }

    /// The session's package, loading it on first access.
    pub async fn get(&self) -> Result<Arc<DataPackage>, LoadError> {
        let package = self
            .package
            .get_or_try_init(|| self.load())
            .await?;
        Ok(Arc::clone(package))
    }

    async fn load(&self) -> Result<Arc<DataPackage>, LoadError> {
        let start = Instant::now();

        match self.fetch_and_build().await {
            Ok(package) => {
                let elapsed = start.elapsed();
                self.record_load("success", elapsed);
                info!(
                    orders = package.merged.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "data package loaded",
                );
                Ok(Arc::new(package))
            }
            Err(e) => {
                self.record_load("error", start.elapsed());
                error!(error = %e, "loading data package");
                Err(e)
            }
        }
    }

    async fn fetch_and_build(&self) -> Result<DataPackage, LoadError> {
        let (fulfillment, environmental) = tokio::try_join!(
            self.store.fetch_fulfillment(),
            self.store.fetch_environmental(),
        )?;

        Ok(build_package(&fulfillment, &environmental)?)
    }

    fn record_load(&self, status: &str, duration: Duration) {
        if let Some(ref cb) = self.metrics {
            cb(status, duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::record::{EnvironmentalRecord, FulfillmentRecord, OrderId};
    use crate::store::memory::MemoryStore;

    fn order(id: &str, day: u32) -> FulfillmentRecord {
        let ts = Utc
            .with_ymd_and_hms(2024, 6, day, 10, 0, 0)
            .single()
            .expect("valid date");
        FulfillmentRecord {
            order_id: OrderId(id.to_string()),
            timestamp: Some(ts),
            ship_date: Some(ts),
            pack_date: ts,
            defect_reported: None,
            metadata: serde_json::Map::new(),
        }
    }

    fn reading(day: u32) -> EnvironmentalRecord {
        EnvironmentalRecord {
            timestamp: Utc
                .with_ymd_and_hms(2024, 6, day, 10, 0, 0)
                .single()
                .expect("valid date"),
            noise_level: 45.0,
            temperature: 72.0,
        }
    }

    #[tokio::test]
    async fn test_cache_loads_once_and_goes_stale() {
        let store = Arc::new(MemoryStore::new(vec![order("a", 1)], vec![reading(1)]));
        let cache = SessionCache::new(Arc::clone(&store));
        assert!(!cache.is_loaded());

        let first = cache.get().await.expect("first load");
        assert_eq!(first.merged.len(), 1);
        assert!(cache.is_loaded());
        let fetches = store.fetch_count();

        // New rows land after the session loaded.
        store.push_fulfillment(order("b", 2));
        store.push_environmental(reading(2));

        let second = cache.get().await.expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.merged.len(), 1);
        assert_eq!(store.fetch_count(), fetches);

        // A fresh session sees the new rows.
        let fresh = SessionCache::new(Arc::clone(&store));
        assert_eq!(fresh.get().await.expect("fresh load").merged.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_does_not_keep_failures() {
        let store = Arc::new(MemoryStore::new(vec![order("a", 1)], Vec::new()));
        let cache = SessionCache::new(Arc::clone(&store));

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch(FetchError::EmptyTable { .. })));
        assert!(!cache.is_loaded());

        store.push_environmental(reading(1));
        assert!(cache.get().await.is_ok());
    }

    #[tokio::test]
    async fn test_cache_reports_load_metrics() {
        use std::sync::Mutex;

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);

        let store = Arc::new(MemoryStore::new(Vec::new(), vec![reading(1)]));
        let cache = SessionCache::new(Arc::clone(&store)).with_metrics(Box::new(
            move |status, _| sink.lock().expect("lock").push(status.to_string()),
        ));

        assert!(cache.get().await.is_err());
        store.push_fulfillment(order("a", 1));
        assert!(cache.get().await.is_ok());
        assert!(cache.get().await.is_ok());

        assert_eq!(*statuses.lock().expect("lock"), vec!["error", "success"]);
    }
}
