//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - **Driven Adapters (Outbound)**
//!   - `persistence/`: In-memory repositories
//!   - `broker/`: Paper broker
//!   - `account/`: Capital, credentials and correlations
//!   - `notify/`: Notification broadcast, audit log, panic escalation
//!   - `clock`: Wall and manual clocks
//!
//! - **Driver Adapters (Inbound)**
//!   - `http/`: REST API controllers
//!
//! - `config/`: Dependency injection container

pub mod account;
pub mod broker;
pub mod clock;
pub mod config;
pub mod http;
pub mod notify;
pub mod persistence;
