//! Panic escalation over an mpsc channel.
//!
//! The requesting side never blocks: when the channel is full a panic is
//! already queued, so the extra request is dropped with a warning.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::application::ports::{EscalationPort, PanicRequest, PortError};

/// Sending half of the escalation channel.
#[derive(Debug, Clone)]
pub struct ChannelEscalation {
    tx: mpsc::Sender<PanicRequest>,
}

impl ChannelEscalation {
    /// Create the escalation port and the receiver the scheduler consumes.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PanicRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EscalationPort for ChannelEscalation {
    async fn request_panic(&self, request: PanicRequest) -> Result<(), PortError> {
        match self.tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!(reason = %request.reason, "Panic already queued, dropping duplicate request");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PortError::unavailable(
                "escalation",
                "panic consumer has shut down",
            )),
        }
    }
}
