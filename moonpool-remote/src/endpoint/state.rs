//! Endpoint state machine.

use std::fmt;

/// Lifecycle state of an [`EndpointWriter`](super::EndpointWriter).
///
/// # State Transitions
///
/// ```text
/// Idle → Connecting → Ready → Terminating → Terminated
///             ↓         ↓
///          Faulted ← ───┘ (send failed)
/// ```
///
/// A `Faulted` writer is never reused: the supervisor discards it and starts
/// a fresh one in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Created, nothing dialed yet.
    Idle,

    /// Handshake in progress.
    Connecting,

    /// Handshake completed, batches may be sent.
    Ready,

    /// Stop requested, connection still open.
    Terminating,

    /// Connection closed.
    Terminated,

    /// Fatal failure reported to the supervisor.
    Faulted,
}

impl EndpointState {
    /// Check if transition to `next` is valid.
    pub fn can_transition_to(&self, next: EndpointState) -> bool {
        use EndpointState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Ready)
                | (Connecting, Faulted)
                | (Ready, Faulted)
                | (_, Terminating)
                | (Terminating, Terminated)
        ) && !self.is_terminal()
    }

    /// Only a ready endpoint may put batches on the wire.
    pub fn can_send(&self) -> bool {
        matches!(self, EndpointState::Ready)
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EndpointState::Terminated)
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointState::Idle => "idle",
            EndpointState::Connecting => "connecting",
            EndpointState::Ready => "ready",
            EndpointState::Terminating => "terminating",
            EndpointState::Terminated => "terminated",
            EndpointState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}
