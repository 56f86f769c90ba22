use std::collections::HashSet;

use crate::domain::order::{Order, OrderHeader, OrderedProduct};
use super::core::OrderRow;

// ============================================================================
// Row Aggregator - Flat Join Rows -> Nested Orders
// ============================================================================
//
// Single pass over rows grouped by order id. At most one order is being
// accumulated at any time; it is emitted when the order id changes and once
// more when the input ends.
//
// Rows of one order must be contiguous. An order id showing up again after
// its group was closed fails with SortOrderViolation instead of producing a
// second aggregate for the same order.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("Order {order_id} reappeared after its rows were closed")]
    SortOrderViolation { order_id: String },
}

/// Order being accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub header: OrderHeader,
    pub products: Vec<OrderedProduct>,
}

impl PendingOrder {
    fn open(row: OrderRow) -> Self {
        let header = row.header();
        Self {
            header,
            products: row.line_item.into_iter().collect(),
        }
    }

    fn into_order(self) -> Order {
        Order::from_parts(self.header, self.products)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum AggregatorState {
    #[default]
    Empty,
    Accumulating(PendingOrder),
}

/// Pure transition: feed one row, get the next state and the order that the
/// row closed, if any.
pub fn step(state: AggregatorState, row: OrderRow) -> (AggregatorState, Option<Order>) {
    match state {
        AggregatorState::Empty => (AggregatorState::Accumulating(PendingOrder::open(row)), None),
        AggregatorState::Accumulating(mut pending) if pending.header.id == row.order_id => {
            pending.products.extend(row.line_item);
            (AggregatorState::Accumulating(pending), None)
        }
        AggregatorState::Accumulating(pending) => (
            AggregatorState::Accumulating(PendingOrder::open(row)),
            Some(pending.into_order()),
        ),
    }
}

/// Flush whatever is still being accumulated.
pub fn flush(state: AggregatorState) -> Option<Order> {
    match state {
        AggregatorState::Empty => None,
        AggregatorState::Accumulating(pending) => Some(pending.into_order()),
    }
}

/// Stateful driver of [`step`] that also enforces the contiguity contract.
///
/// Only one order is accumulated at a time, but the ids of emitted orders are
/// remembered to detect a reappearing id, so memory grows with the number of
/// orders in the input. Contiguity is checked without assuming any ordering
/// between ids: the store's text collation need not match byte order.
#[derive(Debug, Default)]
pub struct RowAggregator {
    state: AggregatorState,
    closed: HashSet<String>,
    rows_seen: u64,
}

impl RowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: OrderRow) -> Result<Option<Order>, AggregationError> {
        if self.closed.contains(&row.order_id) {
            return Err(AggregationError::SortOrderViolation {
                order_id: row.order_id,
            });
        }

        self.rows_seen += 1;
        let (state, emitted) = step(std::mem::take(&mut self.state), row);
        self.state = state;

        if let Some(order) = &emitted {
            self.closed.insert(order.id.clone());
        }

        Ok(emitted)
    }

    /// Consume the aggregator and return the last order, if any.
    pub fn finish(self) -> Option<Order> {
        flush(self.state)
    }

    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    /// Lazily aggregate any row iterator.
    pub fn aggregate<I>(rows: I) -> Aggregated<I::IntoIter>
    where
        I: IntoIterator<Item = OrderRow>,
    {
        Aggregated {
            rows: rows.into_iter(),
            aggregator: Some(Self::new()),
        }
    }
}

/// Iterator returned by [`RowAggregator::aggregate`]. Stops after the first
/// error.
pub struct Aggregated<I> {
    rows: I,
    aggregator: Option<RowAggregator>,
}

impl<I> Iterator for Aggregated<I>
where
    I: Iterator<Item = OrderRow>,
{
    type Item = Result<Order, AggregationError>;

    fn next(&mut self) -> Option<Self::Item> {
        let aggregator = self.aggregator.as_mut()?;

        for row in self.rows.by_ref() {
            match aggregator.push(row) {
                Ok(Some(order)) => return Some(Ok(order)),
                Ok(None) => {}
                Err(e) => {
                    self.aggregator = None;
                    return Some(Err(e));
                }
            }
        }

        self.aggregator.take()?.finish().map(Ok)
    }
}

/// Eagerly aggregate `rows`.
pub fn aggregate_rows<I>(rows: I) -> Result<Vec<Order>, AggregationError>
where
    I: IntoIterator<Item = OrderRow>,
{
    RowAggregator::aggregate(rows).collect()
}

// ============================================================================
// Unit Tests
// ============================================================================
