// Private module declaration
mod server;

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order store
// ============================================================================
//
// - Writes: outcomes, latency, line items written
// - Reads:  listing outcomes, rows scanned, aggregates emitted
//
// All metrics are registered with one Registry, scraped via /metrics
// ============================================================================

pub struct StoreMetrics {
    registry: Registry,

    // Write path
    pub order_puts: IntCounterVec,
    pub order_put_duration: Histogram,
    pub line_items_written: IntCounter,

    // Read path
    pub order_listings: IntCounterVec,
    pub rows_scanned: IntCounter,
    pub orders_emitted: IntCounter,
}

impl StoreMetrics {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register the store metrics with an existing registry.
    pub fn with_registry(registry: Registry) -> anyhow::Result<Self> {
        let order_puts = IntCounterVec::new(
            Opts::new("order_puts_total", "Order writes by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(order_puts.clone()))?;

        let order_put_duration = Histogram::with_opts(
            HistogramOpts::new("order_put_duration_seconds", "Order write duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(order_put_duration.clone()))?;

        let line_items_written = IntCounter::new(
            "order_line_items_written_total",
            "Line items committed as part of an order",
        )?;
        registry.register(Box::new(line_items_written.clone()))?;

        let order_listings = IntCounterVec::new(
            Opts::new("order_listings_total", "Order listings by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(order_listings.clone()))?;

        let rows_scanned = IntCounter::new(
            "order_rows_scanned_total",
            "Join rows read from order cursors",
        )?;
        registry.register(Box::new(rows_scanned.clone()))?;

        let orders_emitted = IntCounter::new(
            "orders_emitted_total",
            "Order aggregates rebuilt from join rows",
        )?;
        registry.register(Box::new(orders_emitted.clone()))?;

        Ok(Self {
            registry,
            order_puts,
            order_put_duration,
            line_items_written,
            order_listings,
            rows_scanned,
            orders_emitted,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `failure` is the error kind, `None` on success.
    pub fn record_put(&self, duration_secs: f64, failure: Option<&str>) {
        self.order_puts
            .with_label_values(&[failure.unwrap_or("committed")])
            .inc();
        self.order_put_duration.observe(duration_secs);
    }

    pub fn record_line_items(&self, count: usize) {
        self.line_items_written.inc_by(count as u64);
    }

    pub fn record_listing(&self, outcome: &str) {
        self.order_listings.with_label_values(&[outcome]).inc();
    }

    pub fn record_row(&self) {
        self.rows_scanned.inc();
    }

    pub fn record_emitted(&self) {
        self.orders_emitted.inc();
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = StoreMetrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_put_outcomes() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.record_put(0.01, None);
        metrics.record_put(0.02, Some("conflict"));
        metrics.record_put(0.03, None);

        assert_eq!(metrics.order_puts.with_label_values(&["committed"]).get(), 2);
        assert_eq!(metrics.order_puts.with_label_values(&["conflict"]).get(), 1);
        assert_eq!(metrics.order_put_duration.get_sample_count(), 3);
    }

    #[test]
    fn test_record_read_path() {
        let metrics = StoreMetrics::new().unwrap();
        metrics.record_row();
        metrics.record_row();
        metrics.record_emitted();
        metrics.record_listing("complete");

        let gathered = metrics.registry.gather();
        let rows = gathered
            .iter()
            .find(|m| m.name() == "order_rows_scanned_total")
            .unwrap();
        assert_eq!(rows.metric[0].counter.value, Some(2.0));
        assert_eq!(metrics.orders_emitted.get(), 1);
    }

    #[test]
    fn test_shared_registry_rejects_duplicate_registration() {
        let registry = Registry::new();
        assert!(StoreMetrics::with_registry(registry.clone()).is_ok());
        assert!(StoreMetrics::with_registry(registry).is_err());
    }
}
