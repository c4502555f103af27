//! Idempotency Bounded Context
//!
//! Deduplication records for externally triggered mutating calls.

pub mod record;
pub mod repository;

pub use record::{IdempotencyKey, IdempotencyRecord, IdempotencyStatus, request_hash};
pub use repository::{ClaimOutcome, IdempotencyRepository};
