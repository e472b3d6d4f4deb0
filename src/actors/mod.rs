// ============================================================================
// Actors Module
// ============================================================================
//
// Infrastructure actors only:
// - core/           - shared health types
// - infrastructure/ - DLQ forwarder, health monitor
//
// Message handling itself is not actor-based: the consumer pipelines are
// stateless handlers invoked directly by the subscription dispatchers.
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    dead_letter_topic, AddToDlq, DlqActor, DlqStats, GetDlqStats, GetSystemHealth, HealthMonitorActor,
    SystemHealth, UpdateHealth,
};
