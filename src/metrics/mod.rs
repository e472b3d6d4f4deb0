use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::utils::CircuitState;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - order publication (successes, failures by reason)
// - message handling per subscription (outcome, latency)
// - dead-lettered messages per subscription
// - producer circuit breaker state
//
// Everything lives on one registry, scraped via GET /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Publication
    pub orders_published: IntCounter,
    pub publish_failures: IntCounterVec,

    // Consumption
    pub messages_handled: IntCounterVec,
    pub handler_duration: HistogramVec,
    pub dead_letters: IntCounterVec,

    // Circuit Breaker
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_published = IntCounter::new("orders_published_total", "Orders accepted by the broker")?;
        registry.register(Box::new(orders_published.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new("order_publish_failures_total", "Orders that failed to publish"),
            &["reason"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let messages_handled = IntCounterVec::new(
            Opts::new("messages_handled_total", "Messages handled by a subscription pipeline"),
            &["subscription", "outcome"],
        )?;
        registry.register(Box::new(messages_handled.clone()))?;

        let handler_duration = HistogramVec::new(
            HistogramOpts::new("message_handler_duration_seconds", "Time spent handling one delivery")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["subscription"],
        )?;
        registry.register(Box::new(handler_duration.clone()))?;

        let dead_letters = IntCounterVec::new(
            Opts::new("dead_lettered_messages_total", "Messages parked on a dead-letter topic"),
            &["subscription"],
        )?;
        registry.register(Box::new(dead_letters.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Producer circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_published,
            publish_failures,
            messages_handled,
            handler_duration,
            dead_letters,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// `failure` is `None` when the broker accepted the order.
    pub fn record_publish(&self, failure: Option<&str>) {
        match failure {
            None => self.orders_published.inc(),
            Some(reason) => self.publish_failures.with_label_values(&[reason]).inc(),
        }
    }

    pub fn record_handled(&self, subscription: &str, outcome: &str, duration_secs: f64) {
        self.messages_handled.with_label_values(&[subscription, outcome]).inc();
        self.handler_duration.with_label_values(&[subscription]).observe(duration_secs);
    }

    pub fn record_dead_letter(&self, subscription: &str) {
        self.dead_letters.with_label_values(&[subscription]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
