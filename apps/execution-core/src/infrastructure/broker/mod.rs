//! Broker Adapters
//!
//! Implementations of `BrokerPort`.

mod paper;

pub use paper::{PaperBroker, ScriptStep};
