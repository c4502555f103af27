//! Application Layer
//!
//! The application layer orchestrates domain logic through use cases.
//! It defines:
//!
//! - **Ports**: Interfaces for interacting with external systems
//! - **Services**: Shared guards and the background scheduler
//! - **Use Cases**: Application-specific business rules

pub mod ports;
pub mod services;
pub mod use_cases;
