use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

/// Opaque item descriptor. Items are passed through verbatim and never
/// interpreted by this service; numbers keep their source digits
/// (`arbitrary_precision`).
pub type OrderItem = serde_json::Value;

/// Wire names of the three order fields.
pub const ORDER_ID_FIELD: &str = "orderId";
pub const CUSTOMER_NAME_FIELD: &str = "customerName";
pub const ITEMS_FIELD: &str = "items";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Implicit state of every order in flight. Never written to the wire.
    #[default]
    Pending,
    /// Set by the document-store consumer when it builds its record.
    Processed,
}
