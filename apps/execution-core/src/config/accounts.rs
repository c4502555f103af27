//! Account seeding for the in-memory capital and credential stores.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Accounts configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Starting capital and equity of every user.
    pub default_capital: Decimal,
    /// Users whose live broker credentials are active at startup.
    pub live_users: Vec<String>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            default_capital: dec!(100000),
            live_users: Vec::new(),
        }
    }
}
