// ============================================================================
// Persistence Core - Storage Abstractions
// ============================================================================
//
// Driver traits, the flat join row and the error taxonomy. Nothing in here
// knows about a concrete database.
//
// ============================================================================

pub mod driver;
pub mod errors;
pub mod row;

// Re-export core types for convenience
pub use driver::{RowCursor, StorageDriver, StorageTransaction};
pub use errors::{DriverError, IsTransient, StoreError};
pub use row::{flatten, OrderRow};
