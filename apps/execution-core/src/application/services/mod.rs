//! Application Services
//!
//! Application services coordinate domain logic and infrastructure adapters.
//! They differ from use cases in that they typically run as background tasks
//! or guard shared state used by several use cases.

mod cooldown;
mod idempotency_guard;
mod scheduler;
mod system_guard;

pub use cooldown::CooldownTracker;
pub use idempotency_guard::{IdempotencyError, IdempotencyGuard};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use system_guard::{GuardUpdate, SupervisorError, SystemGuardService};
