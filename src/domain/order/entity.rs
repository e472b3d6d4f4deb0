use serde::{Deserialize, Serialize};

use super::value_objects::{OrderItem, OrderStatus};

// ============================================================================
// Order Entity
// ============================================================================
//
// An Order only comes into existence through `validate`, so holding one means
// the non-empty invariants hold. It is never mutated after construction; each
// consumer derives its own persisted representation from it.
//
// Canonical encoding: `{"orderId", "customerName", "items"}` in that order.
// `serde_json` without `preserve_order` keeps nested object keys sorted, so
// the same order always encodes to the same bytes.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    order_id: String,
    customer_name: String,
    items: Vec<OrderItem>,
    #[serde(skip)]
    status: OrderStatus,
}

impl Order {
    pub(super) fn new(order_id: String, customer_name: String, items: Vec<OrderItem>) -> Self {
        Self {
            order_id,
            customer_name,
            items,
            status: OrderStatus::Pending,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Canonical JSON bytes carried as the broker message body and written as
    /// the object-store snapshot.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Record shape written by the document-store consumer.
    pub fn to_processed_document(&self) -> OrderDocument {
        OrderDocument {
            id: self.order_id.clone(),
            customer_name: self.customer_name.clone(),
            items: self.items.clone(),
            status: OrderStatus::Processed,
        }
    }
}

/// Document-store record, keyed by `id` (the order id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDocument {
    pub id: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
}
