use crate::domain::order::OrderError;

// ============================================================================
// Storage Errors
// ============================================================================
//
// Two layers:
// - DriverError: what a storage driver reports (no order context)
// - StoreError:  what callers of the order store see, always carrying the
//                order id and/or account id the failure belongs to
//
// ============================================================================

/// Failure reported by a storage driver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Row decode failed: {0}")]
    Decode(String),

    #[error("Statement rejected: {0}")]
    Rejected(String),
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::UniqueViolation(db.message().to_string())
            }
            sqlx::Error::Database(db) => Self::Rejected(db.message().to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => Self::Decode(err.to_string()),
            other => Self::Rejected(other.to_string()),
        }
    }
}

/// Error returned by the order store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unreachable while {operation} (order: {order_id:?}, account: {account_id:?}): {source}")]
    Connectivity {
        operation: &'static str,
        order_id: Option<String>,
        account_id: Option<String>,
        source: DriverError,
    },

    #[error("Order {order_id} already exists: {source}")]
    Conflict { order_id: String, source: DriverError },

    #[error("Order {order_id:?} is invalid: {source}")]
    Validation { order_id: String, source: OrderError },

    #[error("Write of order {order_id} rejected by the store: {source}")]
    Storage { order_id: String, source: DriverError },

    #[error("Cursor failed while listing orders for account {account_id}: {source}")]
    Stream { account_id: String, source: DriverError },

    #[error("Rows for order {order_id} were not contiguous in the listing for account {account_id}")]
    SortOrderViolation { account_id: String, order_id: String },

    #[error("Deadline of {timeout_ms}ms elapsed while {operation} (order: {order_id:?}, account: {account_id:?})")]
    Timeout {
        operation: &'static str,
        order_id: Option<String>,
        account_id: Option<String>,
        timeout_ms: u128,
    },
}

impl StoreError {
    /// Classify a driver failure that happened while writing `order_id`.
    pub(crate) fn from_write(err: DriverError, operation: &'static str, order_id: &str) -> Self {
        match err {
            DriverError::UniqueViolation(_) => Self::Conflict {
                order_id: order_id.to_string(),
                source: err,
            },
            DriverError::Unavailable(_) => Self::Connectivity {
                operation,
                order_id: Some(order_id.to_string()),
                account_id: None,
                source: err,
            },
            DriverError::Decode(_) | DriverError::Rejected(_) => Self::Storage {
                order_id: order_id.to_string(),
                source: err,
            },
        }
    }

    /// Classify a driver failure that happened while listing `account_id`.
    ///
    /// Failing to open the cursor because the store is down is a
    /// connectivity problem; anything after that is a stream failure.
    pub(crate) fn from_read(err: DriverError, cursor_open: bool, account_id: &str) -> Self {
        match err {
            DriverError::Unavailable(_) if !cursor_open => Self::Connectivity {
                operation: "opening order cursor",
                order_id: None,
                account_id: Some(account_id.to_string()),
                source: err,
            },
            _ => Self::Stream {
                account_id: account_id.to_string(),
                source: err,
            },
        }
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::Connectivity { order_id, .. } | Self::Timeout { order_id, .. } => {
                order_id.as_deref()
            }
            Self::Conflict { order_id, .. }
            | Self::Validation { order_id, .. }
            | Self::Storage { order_id, .. }
            | Self::SortOrderViolation { order_id, .. } => Some(order_id),
            Self::Stream { .. } => None,
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::Connectivity { account_id, .. } | Self::Timeout { account_id, .. } => {
                account_id.as_deref()
            }
            Self::Stream { account_id, .. } | Self::SortOrderViolation { account_id, .. } => {
                Some(account_id)
            }
            Self::Conflict { .. } | Self::Validation { .. } | Self::Storage { .. } => None,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "connectivity",
            Self::Conflict { .. } => "conflict",
            Self::Validation { .. } => "validation",
            Self::Storage { .. } => "storage",
            Self::Stream { .. } => "stream",
            Self::SortOrderViolation { .. } => "sort_order_violation",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Check if an error is transient (worth retrying by a supervisor) or permanent
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout { .. })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_errors_are_classified() {
        let conflict = StoreError::from_write(
            DriverError::UniqueViolation("orders_pkey".into()),
            "inserting order header",
            "o1",
        );
        assert!(matches!(conflict, StoreError::Conflict { ref order_id, .. } if order_id == "o1"));
        assert!(!conflict.is_transient());

        let down = StoreError::from_write(
            DriverError::Unavailable("connection refused".into()),
            "beginning transaction",
            "o1",
        );
        assert!(matches!(down, StoreError::Connectivity { .. }));
        assert!(down.is_transient());
        assert_eq!(down.order_id(), Some("o1"));

        let rejected = StoreError::from_write(
            DriverError::Rejected("value too long".into()),
            "bulk inserting line items",
            "o1",
        );
        assert_eq!(rejected.kind(), "storage");
    }

    #[test]
    fn test_read_errors_are_classified() {
        let down = StoreError::from_read(DriverError::Unavailable("refused".into()), false, "a1");
        assert!(matches!(down, StoreError::Connectivity { .. }));
        assert_eq!(down.account_id(), Some("a1"));

        let mid_stream = StoreError::from_read(DriverError::Unavailable("reset".into()), true, "a1");
        assert!(matches!(mid_stream, StoreError::Stream { .. }));
        assert!(!mid_stream.is_transient());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = StoreError::SortOrderViolation {
            account_id: "a1".into(),
            order_id: "o7".into(),
        };
        let message = err.to_string();
        assert!(message.contains("o7"));
        assert!(message.contains("a1"));
    }

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err: DriverError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DriverError::Unavailable(_)));

        let err: DriverError = sqlx::Error::ColumnNotFound("quantity".into()).into();
        assert!(matches!(err, DriverError::Decode(_)));
    }
}
