use async_trait::async_trait;

use crate::domain::order::{OrderHeader, OrderedProduct};
use super::errors::DriverError;
use super::row::OrderRow;

// ============================================================================
// Storage Driver Seam
// ============================================================================
//
// The minimal shape the order store needs from a relational store:
// - StorageDriver:      opens transactions and cursors, answers pings
// - StorageTransaction: header insert + one bulk line-item insert, then
//                       commit or rollback
// - RowCursor:          sequential reads of the flat join rows
//
// Dropping a transaction without committing must discard its writes.
//
// ============================================================================

#[async_trait]
pub trait StorageDriver: Send + Sync + 'static {
    type Transaction: StorageTransaction;
    type Cursor: RowCursor;

    async fn begin(&self) -> Result<Self::Transaction, DriverError>;

    /// Open a cursor over the join rows of `account_id`, sorted by order id
    /// and then by line-item position.
    async fn query_orders_for_account(&self, account_id: &str) -> Result<Self::Cursor, DriverError>;

    async fn ping(&self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait StorageTransaction: Send {
    /// Returns the number of rows written.
    async fn insert_header(&mut self, header: &OrderHeader) -> Result<u64, DriverError>;

    /// Write every line item of `order_id` as one statement. Positions are
    /// the slice indices.
    async fn bulk_insert_line_items(
        &mut self,
        order_id: &str,
        line_items: &[OrderedProduct],
    ) -> Result<u64, DriverError>;

    async fn commit(self) -> Result<(), DriverError>;

    async fn rollback(self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait RowCursor: Send {
    /// Next row, or `None` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<OrderRow>, DriverError>;

    async fn close(self);
}
