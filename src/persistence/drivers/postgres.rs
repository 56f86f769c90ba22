//! Postgres driver built on `sqlx`.
//!
//! Layout:
//! - `orders(id PRIMARY KEY, created_at, account_id, total_price)`
//! - `order_products(order_id REFERENCES orders, position, product_id, quantity)`
//!
//! `position` keeps line items in the order the caller supplied them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::domain::order::{OrderHeader, OrderedProduct};
use crate::persistence::core::{
    DriverError, OrderRow, RowCursor, StorageDriver, StorageTransaction,
};

const CREATE_ORDERS: &str = r"
    CREATE TABLE IF NOT EXISTS orders (
        id          TEXT PRIMARY KEY,
        created_at  TIMESTAMPTZ NOT NULL,
        account_id  TEXT NOT NULL,
        total_price NUMERIC NOT NULL
    )";

const CREATE_ORDER_PRODUCTS: &str = r"
    CREATE TABLE IF NOT EXISTS order_products (
        order_id   TEXT NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        position   INTEGER NOT NULL,
        product_id TEXT NOT NULL,
        quantity   INTEGER NOT NULL CHECK (quantity >= 1),
        PRIMARY KEY (order_id, position)
    )";

const CREATE_ACCOUNT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS orders_account_id_idx ON orders (account_id, id)";

const INSERT_HEADER: &str = r"
    INSERT INTO orders (id, created_at, account_id, total_price)
    VALUES ($1, $2, $3, $4)";

const INSERT_LINE_ITEMS: &str = r"
    INSERT INTO order_products (order_id, position, product_id, quantity)
    SELECT $1, t.position, t.product_id, t.quantity
    FROM UNNEST($2::INTEGER[], $3::TEXT[], $4::INTEGER[]) AS t (position, product_id, quantity)";

const SELECT_ORDERS_FOR_ACCOUNT: &str = r"
    SELECT o.id, o.created_at, o.account_id, o.total_price, op.product_id, op.quantity
    FROM orders o
    LEFT JOIN order_products op ON op.order_id = o.id
    WHERE o.account_id = $1
    ORDER BY o.id ASC, op.position ASC";

pub struct PostgresDriver {
    pool: PgPool,
    cursor_buffer: usize,
}

impl PostgresDriver {
    /// Connect once. Retrying belongs to whoever supervises the process.
    pub async fn connect(config: &StoreConfig) -> Result<Self, DriverError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "PostgreSQL connection pool initialized"
        );

        Ok(Self::with_pool(pool, config.cursor_buffer))
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: PgPool, cursor_buffer: usize) -> Self {
        Self {
            pool,
            cursor_buffer: cursor_buffer.max(1),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the order tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), DriverError> {
        for statement in [CREATE_ORDERS, CREATE_ORDER_PRODUCTS, CREATE_ACCOUNT_INDEX] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Order schema ensured");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}

#[async_trait]
impl StorageDriver for PostgresDriver {
    type Transaction = PostgresTransaction;
    type Cursor = PostgresCursor;

    async fn begin(&self) -> Result<PostgresTransaction, DriverError> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }

    async fn query_orders_for_account(&self, account_id: &str) -> Result<PostgresCursor, DriverError> {
        // Fail here, not on the first read, when the pool cannot serve us.
        let conn = self.pool.acquire().await?;
        let (sender, receiver) = mpsc::channel(self.cursor_buffer);
        let account_id = account_id.to_string();

        let reader = tokio::spawn(async move {
            let mut conn = conn;
            let mut rows = sqlx::query(SELECT_ORDERS_FOR_ACCOUNT)
                .bind(&account_id)
                .fetch(&mut *conn);

            while let Some(row) = rows.next().await {
                let row = row.map_err(DriverError::from).and_then(|r| decode_row(&r));
                let failed = row.is_err();

                // Receiver gone means the cursor was closed or dropped.
                if sender.send(row).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(PostgresCursor {
            receiver,
            reader: Some(reader),
        })
    }

    async fn ping(&self) -> Result<(), DriverError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> Result<OrderRow, DriverError> {
    let header = OrderHeader {
        id: row.try_get::<String, _>("id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        account_id: row.try_get::<String, _>("account_id")?,
        total_price: row.try_get::<Decimal, _>("total_price")?,
    };
    let order_id = header.id.clone();
    let product_id = row.try_get::<Option<String>, _>("product_id")?;
    let quantity = row.try_get::<Option<i32>, _>("quantity")?;

    OrderRow::from_columns(header, product_id, quantity).ok_or_else(|| {
        DriverError::Decode(format!(
            "order {} has a line item with only one of product_id/quantity set",
            order_id
        ))
    })
}

pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTransaction for PostgresTransaction {
    async fn insert_header(&mut self, header: &OrderHeader) -> Result<u64, DriverError> {
        let result = sqlx::query(INSERT_HEADER)
            .bind(&header.id)
            .bind(header.created_at)
            .bind(&header.account_id)
            .bind(header.total_price)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn bulk_insert_line_items(
        &mut self,
        order_id: &str,
        line_items: &[OrderedProduct],
    ) -> Result<u64, DriverError> {
        let positions = (0..line_items.len())
            .map(i32::try_from)
            .collect::<Result<Vec<i32>, _>>()
            .map_err(|_| DriverError::Rejected(format!("order {} has too many line items", order_id)))?;
        let product_ids: Vec<String> = line_items.iter().map(|p| p.product_id.clone()).collect();
        let quantities: Vec<i32> = line_items.iter().map(|p| p.quantity).collect();

        let result = sqlx::query(INSERT_LINE_ITEMS)
            .bind(order_id)
            .bind(positions)
            .bind(product_ids)
            .bind(quantities)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), DriverError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DriverError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Rows are pulled by a background task and handed over through a bounded
/// channel; closing the cursor stops that task.
pub struct PostgresCursor {
    receiver: mpsc::Receiver<Result<OrderRow, DriverError>>,
    reader: Option<tokio::task::JoinHandle<()>>,
}

#[async_trait]
impl RowCursor for PostgresCursor {
    async fn next_row(&mut self) -> Result<Option<OrderRow>, DriverError> {
        if let Some(row) = self.receiver.recv().await {
            return row.map(Some);
        }

        // Channel drained: only a clean exit of the reader means end of rows.
        match self.reader.take() {
            Some(reader) => match reader.await {
                Ok(()) => Ok(None),
                Err(e) => Err(DriverError::Unavailable(format!("cursor reader stopped: {}", e))),
            },
            None => Ok(None),
        }
    }

    async fn close(mut self) {
        self.receiver.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for PostgresCursor {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Order;
    use crate::persistence::store::OrderStore;
    use chrono::TimeZone;

    async fn driver() -> PostgresDriver {
        let config = StoreConfig::from_env().expect("DATABASE_URL must be set");
        let driver = PostgresDriver::connect(&config).await.unwrap();
        driver.ensure_schema().await.unwrap();
        driver
    }

    #[tokio::test]
    #[ignore = "requires a Postgres instance at DATABASE_URL"]
    async fn test_postgres_round_trip() {
        let store = OrderStore::new(driver().await);
        let account_id = uuid::Uuid::new_v4().to_string();
        let t0 = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let order = Order::new(
            account_id.clone(),
            t0,
            Decimal::new(1998, 2),
            vec![OrderedProduct::new("p2", 2), OrderedProduct::new("p1", 1)],
        );
        let header_only = Order::new(account_id.clone(), Utc::now(), Decimal::ZERO, vec![]);

        store.put(&order).await.unwrap();
        store.put(&header_only).await.unwrap();
        let listed = store.list_orders_for_account(&account_id).await.unwrap();

        let mut expected = vec![order, header_only];
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    #[ignore = "requires a Postgres instance at DATABASE_URL"]
    async fn test_postgres_rejects_nanosecond_timestamp() {
        let store = OrderStore::new(driver().await);
        let mut order = Order::new(uuid::Uuid::new_v4().to_string(), Utc::now(), Decimal::ONE, vec![]);
        order.created_at = order.created_at + chrono::Duration::nanoseconds(1);

        let err = store.put(&order).await.unwrap_err();

        assert_eq!(err.kind(), "validation");
        assert!(store.list_orders_for_account(&order.account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a Postgres instance at DATABASE_URL"]
    async fn test_postgres_duplicate_is_conflict() {
        let store = OrderStore::new(driver().await);
        let order = Order::new("a-dup", Utc::now(), Decimal::ONE, vec![OrderedProduct::new("p1", 1)]);

        store.put(&order).await.unwrap();
        let err = store.put(&order).await.unwrap_err();

        assert_eq!(err.kind(), "conflict");
    }
}
