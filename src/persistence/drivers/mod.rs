// ============================================================================
// Storage Drivers
// ============================================================================
//
// - postgres: production driver (sqlx, Postgres)
// - memory:   in-process transactional driver with fault injection
//
// ============================================================================

pub mod memory;
pub mod postgres;

pub use memory::{Fault, FaultPoint, MemoryDriver};
pub use postgres::PostgresDriver;
