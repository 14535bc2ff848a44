//! Playback session state

/// Session lifecycle state
///
/// `Idle → Open → Draining → Closed`, with `Error` reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Open,
    Draining,
    Closed,
    Error,
}

impl SessionState {
    /// Closed and Error never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Open => write!(f, "open"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Error => write!(f, "error"),
        }
    }
}
