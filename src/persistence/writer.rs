use std::sync::Arc;
use std::time::Instant;

use crate::domain::order::Order;
use crate::metrics::StoreMetrics;
use super::core::{StorageDriver, StorageTransaction, StoreError};

// ============================================================================
// Transactional Writer - One Order, One Transaction
// ============================================================================
//
// BEGIN
//   INSERT header
//   bulk INSERT all line items (skipped for a header-only order)
// COMMIT            (or ROLLBACK on any failure)
//
// The whole aggregate becomes visible at commit, or nothing does. If the
// future is dropped mid-way the transaction is dropped unfinished, which
// every driver treats as a rollback.
//
// ============================================================================

pub struct TransactionalWriter<D: StorageDriver> {
    driver: Arc<D>,
    metrics: Arc<StoreMetrics>,
}

impl<D: StorageDriver> TransactionalWriter<D> {
    pub fn new(driver: Arc<D>, metrics: Arc<StoreMetrics>) -> Self {
        Self { driver, metrics }
    }

    /// Persist `order` atomically.
    pub async fn put(&self, order: &Order) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = self.write(order).await;

        match &result {
            Ok(()) => {
                self.metrics.record_put(started.elapsed().as_secs_f64(), None);
                self.metrics.record_line_items(order.products.len());
                tracing::info!(
                    order_id = %order.id,
                    account_id = %order.account_id,
                    line_items = order.products.len(),
                    "✅ Order committed"
                );
            }
            Err(e) => {
                self.metrics.record_put(started.elapsed().as_secs_f64(), Some(e.kind()));
                tracing::warn!(
                    order_id = %order.id,
                    account_id = %order.account_id,
                    error = %e,
                    "Order write failed"
                );
            }
        }

        result
    }

    async fn write(&self, order: &Order) -> Result<(), StoreError> {
        order.validate().map_err(|source| StoreError::Validation {
            order_id: order.id.clone(),
            source,
        })?;

        let mut tx = self
            .driver
            .begin()
            .await
            .map_err(|e| StoreError::from_write(e, "beginning transaction", &order.id))?;

        if let Err(e) = Self::stage(&mut tx, order).await {
            if let Err(rollback_err) = tx.rollback().await {
                // The driver drops the unfinished transaction either way.
                tracing::warn!(
                    order_id = %order.id,
                    error = %rollback_err,
                    "Rollback failed"
                );
            } else {
                tracing::debug!(order_id = %order.id, "Transaction rolled back");
            }
            return Err(e);
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::from_write(e, "committing transaction", &order.id))
    }

    async fn stage(tx: &mut D::Transaction, order: &Order) -> Result<(), StoreError> {
        tx.insert_header(&order.header())
            .await
            .map_err(|e| StoreError::from_write(e, "inserting order header", &order.id))?;

        if order.products.is_empty() {
            tracing::debug!(order_id = %order.id, "Header-only order, no line items to write");
            return Ok(());
        }

        let written = tx
            .bulk_insert_line_items(&order.id, &order.products)
            .await
            .map_err(|e| StoreError::from_write(e, "bulk inserting line items", &order.id))?;

        tracing::debug!(order_id = %order.id, rows = written, "Line items staged");
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderError, OrderedProduct};
    use crate::persistence::core::DriverError;
    use crate::persistence::drivers::memory::{Fault, FaultPoint, MemoryDriver};
    use chrono::{SubsecRound, Utc};
    use rust_decimal::Decimal;

    fn writer(driver: &Arc<MemoryDriver>) -> TransactionalWriter<MemoryDriver> {
        TransactionalWriter::new(driver.clone(), Arc::new(StoreMetrics::default()))
    }

    fn order(id: &str, products: Vec<OrderedProduct>) -> Order {
        Order {
            id: id.to_string(),
            account_id: "a1".to_string(),
            created_at: Utc::now().trunc_subsecs(6),
            total_price: Decimal::new(1998, 2),
            products,
        }
    }

    #[tokio::test]
    async fn test_put_writes_header_and_line_items() {
        let driver = Arc::new(MemoryDriver::new());
        let o = order("o1", vec![OrderedProduct::new("p1", 2), OrderedProduct::new("p2", 1)]);

        writer(&driver).put(&o).await.unwrap();

        assert!(driver.contains_order("o1").await);
        assert_eq!(driver.line_item_count("o1").await, 2);
    }

    #[tokio::test]
    async fn test_header_only_order_is_persisted() {
        let driver = Arc::new(MemoryDriver::new());

        writer(&driver).put(&order("o1", vec![])).await.unwrap();

        assert!(driver.contains_order("o1").await);
        assert_eq!(driver.line_item_count("o1").await, 0);
    }

    #[tokio::test]
    async fn test_invalid_order_never_opens_a_transaction() {
        let driver = Arc::new(MemoryDriver::new());
        driver.inject(Fault::new(FaultPoint::Begin, DriverError::Unavailable("down".into()))).await;

        let err = writer(&driver).put(&order("", vec![])).await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::Validation { source: OrderError::EmptyOrderId, .. }
        ));
        // The begin fault is still armed, so no transaction was attempted.
        let err = writer(&driver).put(&order("o1", vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_a_conflict() {
        let driver = Arc::new(MemoryDriver::new());
        let w = writer(&driver);
        w.put(&order("o1", vec![OrderedProduct::new("p1", 1)])).await.unwrap();

        let err = w.put(&order("o1", vec![OrderedProduct::new("p9", 9)])).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { ref order_id, .. } if order_id == "o1"));
        assert_eq!(driver.line_item_count("o1").await, 1);
    }

    #[tokio::test]
    async fn test_failed_bulk_insert_rolls_back_header() {
        let driver = Arc::new(MemoryDriver::new());
        driver
            .inject(Fault::new(FaultPoint::BulkInsert, DriverError::Rejected("disk full".into())))
            .await;

        let err = writer(&driver)
            .put(&order("o1", vec![OrderedProduct::new("p1", 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Storage { .. }));
        assert!(!driver.contains_order("o1").await);
        assert_eq!(driver.line_item_count("o1").await, 0);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_nothing_behind() {
        let driver = Arc::new(MemoryDriver::new());
        driver
            .inject(Fault::new(FaultPoint::Commit, DriverError::Unavailable("reset".into())))
            .await;

        let err = writer(&driver)
            .put(&order("o1", vec![OrderedProduct::new("p1", 1)]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("committing"));
        assert!(!driver.contains_order("o1").await);
    }

    #[tokio::test]
    async fn test_dropped_put_commits_nothing() {
        let driver = Arc::new(MemoryDriver::new());
        driver.inject(Fault::stall(FaultPoint::BulkInsert)).await;
        let w = writer(&driver);
        let o = order("o1", vec![OrderedProduct::new("p1", 1)]);

        let outcome =
            tokio::time::timeout(std::time::Duration::from_millis(50), w.put(&o)).await;

        assert!(outcome.is_err(), "put should still be stalled");
        assert!(!driver.contains_order("o1").await);
    }
}
