// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (OrderItem, OrderStatus)
// - Entity (Order) and its persisted document shape (OrderDocument)
// - Validation (validate) and its error type (ValidationError)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod entity;
pub mod validator;

pub use value_objects::*;
pub use errors::*;
pub use entity::*;
pub use validator::*;
