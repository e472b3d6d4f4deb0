use serde_json::{Map, Value};

use super::entity::Order;
use super::errors::ValidationError;
use super::value_objects::{OrderItem, CUSTOMER_NAME_FIELD, ITEMS_FIELD, ORDER_ID_FIELD};

/// Turn an untyped record into a validated [`Order`].
///
/// Used unchanged by the publish endpoint and by every consumer pipeline, so a
/// hand-crafted message that never went through the publisher is held to the
/// same rules. Fields other than the three order fields are ignored.
pub fn validate(raw: &Value) -> Result<Order, ValidationError> {
    let record = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let order_id = required_string(record, ORDER_ID_FIELD)?;
    let customer_name = required_string(record, CUSTOMER_NAME_FIELD)?;
    let items = required_items(record)?;

    Ok(Order::new(order_id, customer_name, items))
}

fn field<'a>(record: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, ValidationError> {
    match record.get(name) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(name)),
        Some(value) => Ok(value),
    }
}

fn required_string(record: &Map<String, Value>, name: &'static str) -> Result<String, ValidationError> {
    match field(record, name)? {
        Value::String(value) if value.is_empty() => Err(ValidationError::EmptyField(name)),
        Value::String(value) => Ok(value.clone()),
        _ => Err(ValidationError::WrongType {
            field: name,
            expected: "a string",
        }),
    }
}

fn required_items(record: &Map<String, Value>) -> Result<Vec<OrderItem>, ValidationError> {
    match field(record, ITEMS_FIELD)? {
        Value::Array(items) if items.is_empty() => Err(ValidationError::EmptyField(ITEMS_FIELD)),
        Value::Array(items) => Ok(items.clone()),
        _ => Err(ValidationError::WrongType {
            field: ITEMS_FIELD,
            expected: "an array",
        }),
    }
}
