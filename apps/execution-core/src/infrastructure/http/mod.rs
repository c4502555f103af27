//! HTTP/REST API adapter.
//!
//! Inbound adapter exposing order entry, manual exits and the operator
//! controls (panic, safe-mode and emergency clearance, reconciliation).
//! Callers are identified by the `X-User-Id` header; authentication happens
//! in front of this service.

mod controller;
mod error;
mod request;
mod response;

pub use controller::{AppState, IDEMPOTENCY_KEY_HEADER, USER_ID_HEADER, create_router};
pub use error::ApiError;
pub use request::{OperatorRequest, PanicCommand, SubmitOrderRequest};
pub use response::{
    ClearResponse, ExitResponse, HealthResponse, OrderDetailResponse, ReconcileResponse,
    SubmitOrderResponse,
};
