use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};

use crate::domain::order::Order;
use crate::health::{ComponentHealth, HealthCheckable, HealthStatus};
use crate::metrics::StoreMetrics;
use crate::persistence::aggregator::{AggregationError, RowAggregator};
use crate::persistence::core::{RowCursor, StorageDriver, StoreError};
use crate::persistence::writer::TransactionalWriter;

// ============================================================================
// Order Store - Public Entry Point
// ============================================================================
//
// put:             validate -> TransactionalWriter (one transaction)
// list_by_account: join cursor -> RowAggregator -> Stream<Order>
//
// The store receives a live driver; it never connects or retries itself.
//
// ============================================================================

/// Orders collected before a listing deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub orders: Vec<Order>,
    /// The deadline cut the listing short; `orders` holds only complete
    /// aggregates emitted before that.
    pub truncated: bool,
}

pub struct OrderStore<D: StorageDriver> {
    driver: Arc<D>,
    writer: TransactionalWriter<D>,
    metrics: Arc<StoreMetrics>,
}

enum ListPhase<C> {
    Opening,
    Reading { cursor: C, aggregator: RowAggregator },
    Finished,
}

impl<D: StorageDriver> OrderStore<D> {
    pub fn new(driver: D) -> Self {
        Self::with_metrics(driver, Arc::new(StoreMetrics::default()))
    }

    pub fn with_metrics(driver: D, metrics: Arc<StoreMetrics>) -> Self {
        let driver = Arc::new(driver);
        Self {
            writer: TransactionalWriter::new(driver.clone(), metrics.clone()),
            driver,
            metrics,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Persist `order` as one atomic unit.
    pub async fn put(&self, order: &Order) -> Result<(), StoreError> {
        self.writer.put(order).await
    }

    /// Like [`put`](Self::put), but gives up after `deadline`. The unfinished
    /// transaction is dropped, so nothing of the order is committed.
    ///
    /// A deadline that fires after COMMIT reached the store still returns
    /// `Timeout`, although the order is durable. Retrying the same order then
    /// fails with `Conflict`; after a `Timeout` that means the first write
    /// landed.
    pub async fn put_with_deadline(&self, order: &Order, deadline: Duration) -> Result<(), StoreError> {
        match tokio::time::timeout(deadline, self.writer.put(order)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_put(deadline.as_secs_f64(), Some("timeout"));
                tracing::warn!(
                    order_id = %order.id,
                    timeout_ms = deadline.as_millis() as u64,
                    "Order write timed out, transaction abandoned"
                );
                Err(StoreError::Timeout {
                    operation: "writing order",
                    order_id: Some(order.id.clone()),
                    account_id: Some(order.account_id.clone()),
                    timeout_ms: deadline.as_millis(),
                })
            }
        }
    }

    /// Stream the orders of `account_id`, ascending by order id.
    ///
    /// Errors end the stream. A failure never yields the order that was
    /// still being accumulated; dropping the stream closes the cursor.
    pub fn list_by_account(
        &self,
        account_id: &str,
    ) -> impl Stream<Item = Result<Order, StoreError>> + Send + '_ {
        let driver = self.driver.as_ref();
        let metrics = self.metrics.as_ref();
        let account_id = account_id.to_string();

        stream::try_unfold(ListPhase::Opening, move |phase| {
            let account_id = account_id.clone();
            async move {
                let (mut cursor, mut aggregator) = match phase {
                    ListPhase::Opening => {
                        let cursor = driver
                            .query_orders_for_account(&account_id)
                            .await
                            .map_err(|e| {
                                metrics.record_listing("failed");
                                StoreError::from_read(e, false, &account_id)
                            })?;
                        tracing::debug!(account_id = %account_id, "Order cursor opened");
                        (cursor, RowAggregator::new())
                    }
                    ListPhase::Reading { cursor, aggregator } => (cursor, aggregator),
                    ListPhase::Finished => return Ok(None),
                };

                loop {
                    let row = match cursor.next_row().await {
                        Ok(Some(row)) => row,
                        Ok(None) => break,
                        Err(e) => {
                            cursor.close().await;
                            metrics.record_listing("failed");
                            tracing::warn!(
                                account_id = %account_id,
                                rows = aggregator.rows_seen(),
                                error = %e,
                                "Order cursor failed, pending order discarded"
                            );
                            return Err(StoreError::from_read(e, true, &account_id));
                        }
                    };
                    metrics.record_row();

                    match aggregator.push(row) {
                        Ok(Some(order)) => {
                            metrics.record_emitted();
                            return Ok(Some((order, ListPhase::Reading { cursor, aggregator })));
                        }
                        Ok(None) => {}
                        Err(AggregationError::SortOrderViolation { order_id }) => {
                            cursor.close().await;
                            metrics.record_listing("failed");
                            tracing::error!(
                                account_id = %account_id,
                                order_id = %order_id,
                                "Order rows are not grouped by order id"
                            );
                            return Err(StoreError::SortOrderViolation { account_id, order_id });
                        }
                    }
                }

                cursor.close().await;
                let rows = aggregator.rows_seen();
                metrics.record_listing("complete");
                tracing::debug!(account_id = %account_id, rows, "Order cursor exhausted");

                Ok::<_, StoreError>(aggregator.finish().map(|order| {
                    metrics.record_emitted();
                    (order, ListPhase::Finished)
                }))
            }
        })
    }

    /// Collect [`list_by_account`](Self::list_by_account).
    pub async fn list_orders_for_account(&self, account_id: &str) -> Result<Vec<Order>, StoreError> {
        let orders: Vec<Order> = self.list_by_account(account_id).try_collect().await?;
        tracing::info!(account_id = %account_id, orders = orders.len(), "Listed orders");
        Ok(orders)
    }

    /// Collect orders until the stream ends or `deadline` passes, whichever
    /// comes first.
    pub async fn list_by_account_with_deadline(
        &self,
        account_id: &str,
        deadline: Duration,
    ) -> Result<Listing, StoreError> {
        let orders_stream = self.list_by_account(account_id);
        futures_util::pin_mut!(orders_stream);

        let expired = tokio::time::sleep(deadline);
        tokio::pin!(expired);

        let mut orders = Vec::new();
        loop {
            tokio::select! {
                next = orders_stream.next() => match next {
                    Some(Ok(order)) => orders.push(order),
                    Some(Err(e)) => return Err(e),
                    None => return Ok(Listing { orders, truncated: false }),
                },
                _ = &mut expired => {
                    self.metrics.record_listing("truncated");
                    tracing::warn!(
                        account_id = %account_id,
                        orders = orders.len(),
                        timeout_ms = deadline.as_millis() as u64,
                        "Order listing deadline elapsed, returning complete orders only"
                    );
                    return Ok(Listing { orders, truncated: true });
                }
            }
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.driver
            .ping()
            .await
            .map_err(|source| StoreError::Connectivity {
                operation: "pinging store",
                order_id: None,
                account_id: None,
                source,
            })
    }
}

#[async_trait]
impl<D: StorageDriver> HealthCheckable for OrderStore<D> {
    async fn check_health(&self) -> ComponentHealth {
        match self.ping().await {
            Ok(()) => ComponentHealth::new(self.component_name(), HealthStatus::Healthy),
            Err(e) => ComponentHealth::new(self.component_name(), HealthStatus::Unhealthy(e.to_string()))
                .with_details("store ping failed"),
        }
    }

    fn component_name(&self) -> &str {
        "order-store"
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
