//! Outbound sinks: notification broadcast, audit log and panic escalation.

mod audit;
mod broadcast;
mod escalation;

pub use audit::InMemoryAuditLog;
pub use broadcast::BroadcastNotifier;
pub use escalation::ChannelEscalation;
