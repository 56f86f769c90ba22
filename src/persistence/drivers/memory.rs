use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::order::{OrderHeader, OrderedProduct};
use crate::persistence::core::{
    DriverError, OrderRow, RowCursor, StorageDriver, StorageTransaction,
};

// ============================================================================
// In-Memory Driver
// ============================================================================
//
// Transactional stand-in for the relational store:
// - writes are staged inside the transaction and applied under one lock at
//   commit, so readers never see a partial order
// - dropping a transaction discards its staged writes
// - cursors read a snapshot taken when they are opened
//
// Faults can be armed to fail or stall a specific step once.
//
// ============================================================================

/// Step a fault is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    HeaderInsert,
    BulkInsert,
    Commit,
    /// Fires once the commit has been applied, before it is acknowledged.
    Committed,
    OpenCursor,
    /// Fires on the cursor read after this many rows were returned.
    CursorRead { after_rows: usize },
}

#[derive(Debug, Clone)]
enum FaultAction {
    Fail(DriverError),
    Stall,
}

#[derive(Debug, Clone)]
pub struct Fault {
    point: FaultPoint,
    action: FaultAction,
}

impl Fault {
    /// Fail the step with `error`.
    pub fn new(point: FaultPoint, error: DriverError) -> Self {
        Self {
            point,
            action: FaultAction::Fail(error),
        }
    }

    /// Never complete the step.
    pub fn stall(point: FaultPoint) -> Self {
        Self {
            point,
            action: FaultAction::Stall,
        }
    }
}

#[derive(Debug, Clone)]
struct LineItemRecord {
    order_id: String,
    position: usize,
    product: OrderedProduct,
}

#[derive(Debug, Default)]
struct Tables {
    orders: BTreeMap<String, OrderHeader>,
    order_products: Vec<LineItemRecord>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    faults: Mutex<Vec<Fault>>,
}

impl Shared {
    /// Take the armed fault for `point`, if any.
    async fn take_fault(&self, point: FaultPoint) -> Option<FaultAction> {
        let mut faults = self.faults.lock().await;
        let index = faults.iter().position(|f| f.point == point)?;
        Some(faults.remove(index).action)
    }

    async fn trip(&self, point: FaultPoint) -> Result<(), DriverError> {
        match self.take_fault(point).await {
            None => Ok(()),
            Some(FaultAction::Fail(err)) => Err(err),
            Some(FaultAction::Stall) => {
                tracing::debug!(?point, "Stalling memory driver step");
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot fault.
    pub async fn inject(&self, fault: Fault) {
        self.shared.faults.lock().await.push(fault);
    }

    pub async fn contains_order(&self, order_id: &str) -> bool {
        self.shared.tables.lock().await.orders.contains_key(order_id)
    }

    pub async fn line_item_count(&self, order_id: &str) -> usize {
        self.shared
            .tables
            .lock()
            .await
            .order_products
            .iter()
            .filter(|r| r.order_id == order_id)
            .count()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    type Transaction = MemoryTransaction;
    type Cursor = MemoryCursor;

    async fn begin(&self) -> Result<MemoryTransaction, DriverError> {
        self.shared.trip(FaultPoint::Begin).await?;

        Ok(MemoryTransaction {
            shared: self.shared.clone(),
            header: None,
            line_items: Vec::new(),
        })
    }

    async fn query_orders_for_account(&self, account_id: &str) -> Result<MemoryCursor, DriverError> {
        self.shared.trip(FaultPoint::OpenCursor).await?;

        let tables = self.shared.tables.lock().await;
        let mut rows = VecDeque::new();

        // BTreeMap iteration is ascending by order id.
        for header in tables.orders.values().filter(|h| h.account_id == account_id) {
            let mut items: Vec<&LineItemRecord> = tables
                .order_products
                .iter()
                .filter(|r| r.order_id == header.id)
                .collect();
            items.sort_by_key(|r| r.position);

            if items.is_empty() {
                rows.push_back(row_for(header, None));
            }
            for item in items {
                rows.push_back(row_for(header, Some(item.product.clone())));
            }
        }

        Ok(MemoryCursor {
            shared: self.shared.clone(),
            rows,
            returned: 0,
        })
    }

    async fn ping(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

fn row_for(header: &OrderHeader, line_item: Option<OrderedProduct>) -> OrderRow {
    OrderRow {
        order_id: header.id.clone(),
        account_id: header.account_id.clone(),
        created_at: header.created_at,
        total_price: header.total_price,
        line_item,
    }
}

pub struct MemoryTransaction {
    shared: Arc<Shared>,
    header: Option<OrderHeader>,
    line_items: Vec<LineItemRecord>,
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn insert_header(&mut self, header: &OrderHeader) -> Result<u64, DriverError> {
        self.shared.trip(FaultPoint::HeaderInsert).await?;

        let exists = self.shared.tables.lock().await.orders.contains_key(&header.id);
        if exists || self.header.is_some() {
            return Err(DriverError::UniqueViolation(format!(
                "duplicate key value violates unique constraint \"orders_pkey\" ({})",
                header.id
            )));
        }

        self.header = Some(header.clone());
        Ok(1)
    }

    async fn bulk_insert_line_items(
        &mut self,
        order_id: &str,
        line_items: &[OrderedProduct],
    ) -> Result<u64, DriverError> {
        self.shared.trip(FaultPoint::BulkInsert).await?;

        if self.header.as_ref().map(|h| h.id.as_str()) != Some(order_id) {
            return Err(DriverError::Rejected(format!(
                "insert on order_products violates foreign key (order {})",
                order_id
            )));
        }

        self.line_items
            .extend(line_items.iter().enumerate().map(|(position, product)| LineItemRecord {
                order_id: order_id.to_string(),
                position,
                product: product.clone(),
            }));
        Ok(line_items.len() as u64)
    }

    async fn commit(self) -> Result<(), DriverError> {
        self.shared.trip(FaultPoint::Commit).await?;

        let mut tables = self.shared.tables.lock().await;
        if let Some(header) = self.header {
            // A concurrent transaction may have committed the same id.
            if tables.orders.contains_key(&header.id) {
                return Err(DriverError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint \"orders_pkey\" ({})",
                    header.id
                )));
            }
            tables.orders.insert(header.id.clone(), header);
        }
        tables.order_products.extend(self.line_items);
        drop(tables);

        self.shared.trip(FaultPoint::Committed).await
    }

    async fn rollback(self) -> Result<(), DriverError> {
        Ok(())
    }
}

pub struct MemoryCursor {
    shared: Arc<Shared>,
    rows: VecDeque<OrderRow>,
    returned: usize,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn next_row(&mut self) -> Result<Option<OrderRow>, DriverError> {
        self.shared
            .trip(FaultPoint::CursorRead {
                after_rows: self.returned,
            })
            .await?;

        let row = self.rows.pop_front();
        if row.is_some() {
            self.returned += 1;
        }
        Ok(row)
    }

    async fn close(self) {
        tracing::debug!(unread = self.rows.len(), "Memory cursor closed");
    }
}
