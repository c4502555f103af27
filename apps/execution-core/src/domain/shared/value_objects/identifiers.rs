//! Strongly-typed identifiers for domain entities.
//!
//! These prevent mixing a client key with a broker id or a trade id.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a new unique identifier using UUID v4.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    ClientOrderId,
    "Client-generated order key. Unique per order intent and reused on resubmission."
);
define_id!(
    BrokerOrderId,
    "Broker's identifier for an order, known once the broker acknowledges it."
);
define_id!(TradeId, "Unique identifier for a trade (position lifecycle).");
define_id!(UserId, "Identifier for the account owner an order or trade belongs to.");
define_id!(ExitRetryId, "Unique identifier for an exit retry request.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_order_id_new_and_display() {
        let id = ClientOrderId::new("co-123");
        assert_eq!(id.as_str(), "co-123");
        assert_eq!(format!("{id}"), "co-123");
    }

    #[test]
    fn generate_is_unique() {
        assert_ne!(ClientOrderId::generate(), ClientOrderId::generate());
        assert_ne!(TradeId::generate(), TradeId::generate());
    }

    #[test]
    fn from_string() {
        let id: BrokerOrderId = "brk-1".into();
        assert_eq!(id.as_str(), "brk-1");

        let id: UserId = String::from("user-7").into();
        assert_eq!(id.into_inner(), "user-7");
    }

    #[test]
    fn serde_is_transparent() {
        let id = TradeId::new("t-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t-1\"");

        let parsed: TradeId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn hash_works_for_collections() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(UserId::new("u-1"));
        set.insert(UserId::new("u-2"));
        set.insert(UserId::new("u-1"));

        assert_eq!(set.len(), 2);
    }
}
