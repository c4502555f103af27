//! Symmetric correlation lookup table.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{CorrelationPort, PortError};
use crate::domain::shared::Symbol;

/// Pairwise correlations, stored under an order-independent key.
#[derive(Debug, Default)]
pub struct InMemoryCorrelationTable {
    pairs: RwLock<HashMap<(Symbol, Symbol), f64>>,
}

impl InMemoryCorrelationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the correlation between two symbols, clamped to [-1, 1].
    pub fn set(&self, a: &Symbol, b: &Symbol, correlation: f64) {
        self.pairs
            .write()
            .insert(key(a, b), correlation.clamp(-1.0, 1.0));
    }
}

fn key(a: &Symbol, b: &Symbol) -> (Symbol, Symbol) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[async_trait]
impl CorrelationPort for InMemoryCorrelationTable {
    async fn correlation(&self, a: &Symbol, b: &Symbol) -> Result<Option<f64>, PortError> {
        if a == b {
            return Ok(Some(1.0));
        }
        Ok(self.pairs.read().get(&key(a, b)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_is_symmetric() {
        let table = InMemoryCorrelationTable::new();
        table.set(&Symbol::new("SPY"), &Symbol::new("QQQ"), 0.92);

        let forward = table.correlation(&Symbol::new("SPY"), &Symbol::new("QQQ")).await.unwrap();
        let backward = table.correlation(&Symbol::new("QQQ"), &Symbol::new("SPY")).await.unwrap();

        assert_eq!(forward, Some(0.92));
        assert_eq!(backward, Some(0.92));
        assert_eq!(
            table.correlation(&Symbol::new("SPY"), &Symbol::new("GLD")).await.unwrap(),
            None
        );
    }
}
