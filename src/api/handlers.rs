use actix_web::{web, HttpResponse, Responder};

use super::AppState;
use crate::actors::GetSystemHealth;
use crate::domain::order::validate;

const PUBLISHED: &str = "Order published successfully.";
const UNEXPECTED: &str = "An unexpected error occurred while processing the order.";

fn bad_request(reason: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::BadRequest().body(format!("Invalid order data: {}", reason))
}

/// The body is read as bytes so a non-JSON body gets the same 400 as a
/// failed validation.
pub async fn publish_order(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected order request: body is not JSON");
            return bad_request(e);
        }
    };

    let order = match validate(&raw) {
        Ok(order) => order,
        Err(e) => {
            tracing::warn!(error = %e, field = ?e.field(), "Rejected order request");
            return bad_request(e);
        }
    };

    match state.publisher.publish(&order).await {
        Ok(()) => HttpResponse::Ok().body(PUBLISHED),
        // already logged by the publisher
        Err(_) => HttpResponse::InternalServerError().body(UNEXPECTED),
    }
}

pub async fn health(state: web::Data<AppState>) -> impl Responder {
    match state.health.send(GetSystemHealth).await {
        Ok(health) if health.overall_status.is_unhealthy() => HttpResponse::ServiceUnavailable().json(health),
        Ok(health) => HttpResponse::Ok().json(health),
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({"status": "unhealthy"}))
        }
    }
}

pub async fn metrics(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.encode() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
