// ============================================================================
// Persistence - Order Aggregate Storage
// ============================================================================
//
// Control flow: OrderStore -> {TransactionalWriter | RowAggregator} -> driver
//
// ============================================================================

pub mod core;
pub mod aggregator;
pub mod writer;
pub mod store;
pub mod drivers;

pub use self::core::*;
pub use aggregator::{aggregate_rows, AggregationError, RowAggregator};
pub use writer::TransactionalWriter;
pub use store::{Listing, OrderStore};
