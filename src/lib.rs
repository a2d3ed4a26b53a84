//! Ship-dock environmental monitoring and warehouse defect analysis.
//!
//! The collector samples noise and temperature and inserts one reading per
//! interval into a remote table store. The analysis side joins those
//! readings with order fulfillment rows and the dashboard charts the
//! resulting defect rates before and after the packing-area mitigation.

pub mod analysis;
pub mod collector;
pub mod config;
pub mod dashboard;
pub mod device;
pub mod export;
pub mod record;
pub mod store;
