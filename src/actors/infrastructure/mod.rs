// ============================================================================
// Infrastructure Actors
// ============================================================================

mod dlq;
mod health_monitor;

pub use dlq::{dead_letter_topic, AddToDlq, DlqActor, DlqStats, GetDlqStats};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
