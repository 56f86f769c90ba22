// ============================================================================
// Order Validation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Order id cannot be empty")]
    EmptyOrderId,

    #[error("Account id cannot be empty")]
    EmptyAccountId,

    #[error("Product id cannot be empty (line item {position})")]
    EmptyProductId { position: usize },

    #[error("created_at {created_at} has sub-microsecond precision")]
    SubMicrosecondTimestamp { created_at: chrono::DateTime<chrono::Utc> },

    #[error("Invalid quantity {quantity} for product {product_id} (must be at least 1)")]
    InvalidQuantity { product_id: String, quantity: i32 },
}
