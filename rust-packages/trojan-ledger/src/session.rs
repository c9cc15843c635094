//! Per-user conversational state.
//!
//! Not persisted; a restart drops every pending prompt.

use std::collections::HashMap;

use crate::user::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// The next free-text message is a candidate rewards wallet.
    AwaitingWalletInput,
}

/// Users absent from the map are `Idle`.
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    states: HashMap<UserId, SessionState>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, user_id: &str) -> SessionState {
        self.states.get(user_id).copied().unwrap_or_default()
    }

    /// `Idle -> AwaitingWalletInput`. Repeating the request while already waiting is a no-op.
    pub fn request_wallet_change(&mut self, user_id: &str) {
        self.states
            .insert(user_id.to_owned(), SessionState::AwaitingWalletInput);
    }

    /// Consumes the state a free-text message should be interpreted against and returns the
    /// user to `Idle`, whatever the message turns out to be.
    pub fn take(&mut self, user_id: &str) -> SessionState {
        self.states.remove(user_id).unwrap_or_default()
    }

    /// Number of users with a prompt outstanding.
    pub fn pending(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_user_is_idle() {
        let sessions = SessionStateMachine::new();
        assert_eq!(sessions.state("1"), SessionState::Idle);
    }

    #[test]
    fn test_take_resets_to_idle() {
        let mut sessions = SessionStateMachine::new();
        sessions.request_wallet_change("1");
        assert_eq!(sessions.state("1"), SessionState::AwaitingWalletInput);

        assert_eq!(sessions.take("1"), SessionState::AwaitingWalletInput);
        assert_eq!(sessions.state("1"), SessionState::Idle);
        assert_eq!(sessions.take("1"), SessionState::Idle);
        assert_eq!(sessions.pending(), 0);
    }

    #[test]
    fn test_sessions_are_per_user() {
        let mut sessions = SessionStateMachine::new();
        sessions.request_wallet_change("1");
        assert_eq!(sessions.take("2"), SessionState::Idle);
        assert_eq!(sessions.state("1"), SessionState::AwaitingWalletInput);
    }
}
