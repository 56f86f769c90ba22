// ============================================================================
// Order Domain - Header + Line Items
// ============================================================================
//
// - Value objects (Order, OrderHeader, OrderedProduct)
// - Errors (OrderError, raised when an order is not fit to be persisted)
//
// ============================================================================

pub mod value_objects;
pub mod errors;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
