use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// One line item. Identity is its position inside the owning order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderedProduct {
    pub product_id: String,
    pub quantity: i32,
}

impl OrderedProduct {
    pub fn new(product_id: impl Into<String>, quantity: i32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Header columns of an order, i.e. everything except the line items.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderHeader {
    pub id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub total_price: Decimal,
}

/// Order aggregate: a header plus its line items in caller-supplied order.
///
/// `total_price` is taken as given; it is never recomputed from `products`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub total_price: Decimal,
    pub products: Vec<OrderedProduct>,
}

impl Order {
    /// Build an order with a freshly assigned id.
    ///
    /// `created_at` is truncated to whole microseconds, the precision the
    /// store keeps.
    pub fn new(
        account_id: impl Into<String>,
        created_at: DateTime<Utc>,
        total_price: Decimal,
        products: Vec<OrderedProduct>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            created_at: created_at.trunc_subsecs(6),
            total_price,
            products,
        }
    }

    pub fn from_parts(header: OrderHeader, products: Vec<OrderedProduct>) -> Self {
        Self {
            id: header.id,
            account_id: header.account_id,
            created_at: header.created_at,
            total_price: header.total_price,
            products,
        }
    }

    pub fn header(&self) -> OrderHeader {
        OrderHeader {
            id: self.id.clone(),
            account_id: self.account_id.clone(),
            created_at: self.created_at,
            total_price: self.total_price,
        }
    }

    /// Check the preconditions for persisting this order.
    ///
    /// An empty `products` list is allowed: such orders are stored header-only.
    /// `created_at` must not carry sub-microsecond digits, which the store
    /// would drop.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.id.trim().is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        if self.account_id.trim().is_empty() {
            return Err(OrderError::EmptyAccountId);
        }
        if self.created_at.timestamp_subsec_nanos() % 1_000 != 0 {
            return Err(OrderError::SubMicrosecondTimestamp {
                created_at: self.created_at,
            });
        }

        for (position, product) in self.products.iter().enumerate() {
            if product.product_id.trim().is_empty() {
                return Err(OrderError::EmptyProductId { position });
            }
            if product.quantity < 1 {
                return Err(OrderError::InvalidQuantity {
                    product_id: product.product_id.clone(),
                    quantity: product.quantity,
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_order() -> Order {
        Order {
            id: "o1".to_string(),
            account_id: "a1".to_string(),
            created_at: Utc::now().trunc_subsecs(6),
            total_price: Decimal::new(1998, 2),
            products: vec![OrderedProduct::new("p1", 2)],
        }
    }

    #[test]
    fn test_new_assigns_unique_ids() {
        let a = Order::new("a1", Utc::now(), Decimal::ZERO, vec![]);
        let b = Order::new("a1", Utc::now(), Decimal::ZERO, vec![]);

        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_header_and_from_parts_are_inverse() {
        let order = sample_order();
        let rebuilt = Order::from_parts(order.header(), order.products.clone());
        assert_eq!(rebuilt, order);
    }

    #[test]
    fn test_validate_accepts_well_formed_order() {
        assert_eq!(sample_order().validate(), Ok(()));
    }

    #[test]
    fn test_validate_accepts_header_only_order() {
        let mut order = sample_order();
        order.products.clear();
        assert_eq!(order.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_missing_ids() {
        let mut order = sample_order();
        order.id = "  ".to_string();
        assert_eq!(order.validate(), Err(OrderError::EmptyOrderId));

        let mut order = sample_order();
        order.account_id.clear();
        assert_eq!(order.validate(), Err(OrderError::EmptyAccountId));
    }

    #[test]
    fn test_validate_rejects_bad_line_items() {
        let mut order = sample_order();
        order.products.push(OrderedProduct::new("", 1));
        assert_eq!(order.validate(), Err(OrderError::EmptyProductId { position: 1 }));

        let mut order = sample_order();
        order.products[0].quantity = 0;
        assert_eq!(
            order.validate(),
            Err(OrderError::InvalidQuantity {
                product_id: "p1".to_string(),
                quantity: 0,
            })
        );
    }

    #[test]
    fn test_new_truncates_created_at_to_microseconds() {
        let t0 = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let order = Order::new("a1", t0, Decimal::ONE, vec![]);

        assert_eq!(order.created_at.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(order.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_sub_microsecond_created_at() {
        let t0 = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let mut order = sample_order();
        order.created_at = t0;

        assert_eq!(
            order.validate(),
            Err(OrderError::SubMicrosecondTimestamp { created_at: t0 })
        );
    }

    #[test]
    fn test_order_serialization() {
        let order = sample_order();
        let json = serde_json::to_string(&order).unwrap();
        let deserialized: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, deserialized);
        assert!(json.contains("\"19.98\""));
    }
}
