//! In-memory account adapters: capital, broker credentials and symbol
//! correlations.

mod capital;
mod correlation;
mod credentials;

pub use capital::InMemoryCapitalStore;
pub use correlation::InMemoryCorrelationTable;
pub use credentials::InMemoryCredentialStore;
