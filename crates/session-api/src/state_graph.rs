//! Allowed state transitions per session kind
//!
//! Every persisted state change must follow an edge of the graph for the
//! session's kind. An edge that is not listed here is a defect in the caller,
//! never a valid state.

use crate::types::{SessionKind, SessionState};
use SessionState::*;

/// Result of checking a requested transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Edge exists in the graph
    Allowed,
    /// Same state as current; nothing to persist
    Unchanged,
    /// Current state is terminal; the request is ignored
    AlreadyTerminal,
    /// Edge does not exist
    Invalid,
}

/// States reachable in one step from `from` for `kind`
pub fn targets(kind: SessionKind, from: SessionState) -> &'static [SessionState] {
    if kind.has_transfer() {
        match from {
            Initiating => &[Ringing, Accepting, Started, Rejected, Aborted, Failed],
            Invited => &[Accepting, Rejected, Aborted, Failed],
            Ringing => &[Accepting, Started, Rejected, Aborted, Failed],
            Accepting => &[Started, Rejected, Aborted, Failed],
            Started => &[Transferred, Aborted, Failed],
            Transferred | Rejected | Aborted | Failed => &[],
        }
    } else {
        match from {
            Initiating => &[Ringing, Accepting, Started, Rejected, Aborted, Failed],
            Invited => &[Accepting, Rejected, Aborted, Failed],
            Ringing => &[Accepting, Started, Rejected, Aborted, Failed],
            Accepting => &[Started, Rejected, Aborted, Failed],
            Started => &[Aborted, Failed],
            Transferred | Rejected | Aborted | Failed => &[],
        }
    }
}

/// States a session may be created in
pub fn is_initial(state: SessionState) -> bool {
    matches!(state, Initiating | Invited | Rejected)
}

/// Classify the transition `from -> to` for `kind`
pub fn check(kind: SessionKind, from: SessionState, to: SessionState) -> Transition {
    if from == to {
        return Transition::Unchanged;
    }
    if from.is_terminal() {
        return Transition::AlreadyTerminal;
    }
    if targets(kind, from).contains(&to) {
        Transition::Allowed
    } else {
        Transition::Invalid
    }
}
