//! Transactional persistence for order aggregates.
//!
//! An order is written as one header row plus its line items inside a single
//! transaction, and read back by streaming the flat header/line-item join
//! and regrouping it into whole orders.

pub mod config;
pub mod domain;
pub mod health;
pub mod metrics;
pub mod persistence;

pub use config::{ConfigError, StoreConfig};
pub use domain::order::{Order, OrderError, OrderHeader, OrderedProduct};
pub use persistence::drivers::{MemoryDriver, PostgresDriver};
pub use persistence::{
    DriverError, IsTransient, Listing, OrderStore, StorageDriver, StoreError,
};
