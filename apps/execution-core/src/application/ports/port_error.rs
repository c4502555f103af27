//! Error shared by the auxiliary driven ports.

/// Failure of a sink, store or lookup adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The adapter could not serve the call.
    #[error("{port} unavailable: {message}")]
    Unavailable {
        /// Port name.
        port: &'static str,
        /// Error details.
        message: String,
    },
}

impl PortError {
    /// Create an `Unavailable` error.
    pub fn unavailable(port: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            port,
            message: message.into(),
        }
    }
}
