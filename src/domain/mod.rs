// ============================================================================
// Domain Layer - Order Aggregate Model
// ============================================================================
//
// Passive value types shared by the write and read paths of the store.
// Nothing in here talks to storage.
//
// ============================================================================

pub mod order;
