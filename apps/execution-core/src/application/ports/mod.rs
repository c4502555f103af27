//! Application Ports (Driven)
//!
//! Ports define how the application uses external systems: the broker, the
//! audit log, notification fan-out, time, account data and escalation.

mod account_port;
mod audit_port;
mod broker_port;
mod clock_port;
mod escalation_port;
mod notification_port;
mod port_error;

pub use account_port::{CapitalPort, CorrelationPort, CredentialStore};
pub use audit_port::{AuditEvent, AuditSink};
pub use broker_port::{BrokerError, BrokerOrder, BrokerPort, BrokerPosition, PlaceOrderRequest};
pub use clock_port::Clock;
pub use escalation_port::{EscalationPort, PanicRequest};
pub use notification_port::{Notification, NotificationKind, NotificationPort};
pub use port_error::PortError;
