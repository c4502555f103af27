//! Per-user capital with a shared default.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{CapitalPort, PortError};
use crate::domain::shared::UserId;

#[derive(Debug, Clone, Copy)]
struct Account {
    equity: Decimal,
    starting_capital: Decimal,
}

/// Capital store. Users without an override use the default account, whose
/// equity and starting capital are both the configured amount.
#[derive(Debug)]
pub struct InMemoryCapitalStore {
    default: Decimal,
    accounts: RwLock<HashMap<UserId, Account>>,
}

impl InMemoryCapitalStore {
    /// Create a store where every user starts with `default_capital`.
    #[must_use]
    pub fn new(default_capital: Decimal) -> Self {
        Self {
            default: default_capital,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Set a user's starting capital and equity.
    pub fn set_account(&self, user_id: UserId, starting_capital: Decimal, equity: Decimal) {
        self.accounts.write().insert(
            user_id,
            Account {
                equity,
                starting_capital,
            },
        );
    }

    /// Update a user's equity, keeping their starting capital.
    pub fn set_equity(&self, user_id: &UserId, equity: Decimal) {
        let mut accounts = self.accounts.write();
        let account = accounts.entry(user_id.clone()).or_insert(Account {
            equity: self.default,
            starting_capital: self.default,
        });
        account.equity = equity;
    }

    fn account(&self, user_id: &UserId) -> Account {
        self.accounts
            .read()
            .get(user_id)
            .copied()
            .unwrap_or(Account {
                equity: self.default,
                starting_capital: self.default,
            })
    }
}

#[async_trait]
impl CapitalPort for InMemoryCapitalStore {
    async fn equity(&self, user_id: &UserId) -> Result<Decimal, PortError> {
        Ok(self.account(user_id).equity)
    }

    async fn starting_capital(&self, user_id: &UserId) -> Result<Decimal, PortError> {
        Ok(self.account(user_id).starting_capital)
    }
}
