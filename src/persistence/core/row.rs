use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, OrderHeader, OrderedProduct};

// ============================================================================
// Flat Join Row
// ============================================================================
//
// One row of `orders LEFT JOIN order_products`: the header columns repeated
// for every line item, and no line item at all for a header-only order.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderRow {
    pub order_id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub total_price: Decimal,
    pub line_item: Option<OrderedProduct>,
}

impl OrderRow {
    /// Build a row from nullable line-item columns.
    ///
    /// Returns `None` when exactly one of the two columns is null, which no
    /// well-formed join can produce.
    pub fn from_columns(
        header: OrderHeader,
        product_id: Option<String>,
        quantity: Option<i32>,
    ) -> Option<Self> {
        let line_item = match (product_id, quantity) {
            (Some(product_id), Some(quantity)) => Some(OrderedProduct { product_id, quantity }),
            (None, None) => None,
            _ => return None,
        };

        Some(Self {
            order_id: header.id,
            account_id: header.account_id,
            created_at: header.created_at,
            total_price: header.total_price,
            line_item,
        })
    }

    pub fn header(&self) -> OrderHeader {
        OrderHeader {
            id: self.order_id.clone(),
            account_id: self.account_id.clone(),
            created_at: self.created_at,
            total_price: self.total_price,
        }
    }
}

/// Rows the join query returns for `order`, in line-item order.
pub fn flatten(order: &Order) -> Vec<OrderRow> {
    let row = |line_item: Option<OrderedProduct>| OrderRow {
        order_id: order.id.clone(),
        account_id: order.account_id.clone(),
        created_at: order.created_at,
        total_price: order.total_price,
        line_item,
    };

    if order.products.is_empty() {
        return vec![row(None)];
    }

    order.products.iter().cloned().map(|p| row(Some(p))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> OrderHeader {
        OrderHeader {
            id: "o1".into(),
            account_id: "a1".into(),
            created_at: Utc::now(),
            total_price: Decimal::new(500, 2),
        }
    }

    #[test]
    fn test_from_columns_pairs_nulls() {
        let with_item = OrderRow::from_columns(header(), Some("p1".into()), Some(2)).unwrap();
        assert_eq!(with_item.line_item, Some(OrderedProduct::new("p1", 2)));

        let header_only = OrderRow::from_columns(header(), None, None).unwrap();
        assert_eq!(header_only.line_item, None);

        assert!(OrderRow::from_columns(header(), Some("p1".into()), None).is_none());
        assert!(OrderRow::from_columns(header(), None, Some(1)).is_none());
    }

    #[test]
    fn test_flatten_emits_one_row_per_line_item() {
        let order = Order::from_parts(
            header(),
            vec![OrderedProduct::new("p1", 1), OrderedProduct::new("p2", 3)],
        );
        let rows = flatten(&order);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.header() == order.header()));
        assert_eq!(rows[1].line_item, Some(OrderedProduct::new("p2", 3)));
    }

    #[test]
    fn test_flatten_header_only_order() {
        let order = Order::from_parts(header(), vec![]);
        let rows = flatten(&order);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line_item, None);
    }
}
