use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a [`PurchaseBridge`](crate::PurchaseBridge).
///
/// ```text
/// Uninitialized ──initialize──> Initializing ──┬──> Ready
///                                    ^         └──> Failed
///                                    └──initialize───────┘
/// (any) ──destroy──> Destroyed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeState {
    #[default]
    Uninitialized,
    /// Store connection in progress
    Initializing,
    Ready,
    /// Store connection failed; requests complete with `BackendUnavailable`
    Failed,
    /// Terminal
    Destroyed,
}

impl BridgeState {
    /// Whether query/purchase/restore requests are accepted in this state.
    pub fn accepts_requests(self) -> bool {
        matches!(self, BridgeState::Ready | BridgeState::Failed)
    }

    /// Whether `initialize` may start a (new) connection attempt.
    pub fn can_initialize(self) -> bool {
        matches!(self, BridgeState::Uninitialized | BridgeState::Failed)
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeState::Uninitialized => "uninitialized",
            BridgeState::Initializing => "initializing",
            BridgeState::Ready => "ready",
            BridgeState::Failed => "failed",
            BridgeState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}
