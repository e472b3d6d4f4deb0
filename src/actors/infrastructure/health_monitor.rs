use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::messaging::RedpandaClient;
use crate::metrics::Metrics;
use crate::utils::CircuitState;

// ============================================================================
// Health Monitor Actor
// ============================================================================
//
// Aggregates component health for `/health`:
// - "broker": polled from the producer's circuit breaker
// - one entry per subscription, pushed by its consumer workers
//
// ============================================================================

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const BROKER_COMPONENT: &str = "broker";

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    redpanda: Option<Arc<RedpandaClient>>,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new() -> Self {
        Self {
            components: BTreeMap::new(),
            redpanda: None,
            metrics: None,
        }
    }

    pub fn watch_broker(mut self, redpanda: Arc<RedpandaClient>) -> Self {
        self.redpanda = Some(redpanda);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => unhealthy_components.push(format!("{}: {}", name, msg)),
                HealthStatus::Degraded(_) => has_degraded = true,
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Default for HealthMonitorActor {
    fn default() -> Self {
        Self::new()
    }
}

fn breaker_status(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor started");

        let addr = ctx.address();
        ctx.run_interval(POLL_INTERVAL, move |act, _ctx| {
            let Some(redpanda) = act.redpanda.clone() else {
                return;
            };
            let metrics = act.metrics.clone();
            let addr = addr.clone();

            actix::spawn(async move {
                let state = redpanda.circuit_state().await;
                if let Some(metrics) = metrics {
                    metrics.update_circuit_breaker_state(state);
                }
                addr.do_send(UpdateHealth {
                    component: BROKER_COMPONENT.to_string(),
                    status: breaker_status(state),
                    details: None,
                });
            });
        });
    }
}

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _: &mut Self::Context) {
        match &msg.status {
            HealthStatus::Healthy => {
                tracing::debug!(component = %msg.component, "Component healthy")
            }
            HealthStatus::Degraded(reason) => {
                tracing::warn!(component = %msg.component, reason = %reason, "Component degraded")
            }
            HealthStatus::Unhealthy(reason) => {
                tracing::error!(component = %msg.component, reason = %reason, "Component unhealthy")
            }
        }

        let health = ComponentHealth::new(msg.component.clone(), msg.status).with_details(msg.details);
        self.components.insert(msg.component, health);
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
