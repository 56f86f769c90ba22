use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_store::health::HealthCheckable;
use order_store::metrics::{self, StoreMetrics};
use order_store::{Order, OrderStore, OrderedProduct, PostgresDriver, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, overridable with RUST_LOG
    // Example: RUST_LOG=order_store=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_store=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order store demo");

    // === 1. Configuration ===
    let config = StoreConfig::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    // === 2. Connect and prepare schema ===
    tracing::info!("Connecting to PostgreSQL...");
    let driver = PostgresDriver::connect(&config).await?;
    driver.ensure_schema().await?;

    let metrics = Arc::new(StoreMetrics::new()?);
    let store = Arc::new(OrderStore::with_metrics(driver, metrics.clone()));

    // === 3. Metrics server ===
    if config.metrics_port != 0 {
        let registry = metrics.registry().clone();
        let health: Arc<dyn HealthCheckable> = store.clone();
        let port = config.metrics_port;

        // actix-web needs its own system; keep it off the main runtime
        std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            if let Err(e) = system.block_on(metrics::start_metrics_server(registry, health, port)) {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    }

    // === 4. Write an order ===
    let account_id = format!("demo-{}", uuid::Uuid::new_v4());
    let order = Order::new(
        account_id.clone(),
        Utc::now(),
        Decimal::new(4497, 2),
        vec![
            OrderedProduct::new("sku-keyboard", 1),
            OrderedProduct::new("sku-keycap-set", 2),
        ],
    );
    store.put_with_deadline(&order, config.put_timeout).await?;

    let header_only = Order::new(account_id.clone(), Utc::now(), Decimal::ZERO, vec![]);
    store.put_with_deadline(&header_only, config.put_timeout).await?;

    // === 5. Read it back ===
    let orders = store.list_orders_for_account(&account_id).await?;
    for order in &orders {
        tracing::info!(
            order_id = %order.id,
            total_price = %order.total_price,
            line_items = order.products.len(),
            "📦 Order"
        );
    }

    let health = store.check_health().await;
    tracing::info!(status = ?health.status, "Store health");

    // === 6. Shutdown ===
    store.driver().close().await;
    tracing::info!("👋 Order store demo finished");

    Ok(())
}
