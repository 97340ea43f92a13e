use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

use crate::error::{PurchaseError, Result};

/// Identifier assigned to every accepted request, increasing per bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to an accepted request.
///
/// The outcome resolves after the matching callback has run and carries the
/// same result the callback received. Dropping the ticket does not cancel
/// the request.
#[derive(Debug)]
pub struct RequestTicket<T> {
    id: RequestId,
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> RequestTicket<T> {
    pub(crate) fn new(id: RequestId) -> (Self, oneshot::Sender<Result<T>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { id, receiver }, sender)
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Waits for the request to complete.
    pub async fn outcome(self) -> Result<T> {
        self.receiver
            .await
            .unwrap_or(Err(PurchaseError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_resolves_with_sent_outcome() {
        let (ticket, reply) = RequestTicket::<u32>::new(RequestId::new(7));
        assert_eq!(ticket.id().value(), 7);

        reply.send(Ok(42)).unwrap();
        assert_eq!(ticket.outcome().await, Ok(42));
    }

    #[tokio::test]
    async fn test_dropped_reply_reads_as_cancelled() {
        let (ticket, reply) = RequestTicket::<()>::new(RequestId::new(1));
        drop(reply);
        assert_eq!(ticket.outcome().await, Err(PurchaseError::Cancelled));
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestId::new(3).to_string(), "#3");
    }
}
