use crate::error::SessionError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Complete,
    Failed { reason: String },
}

/// Tracks the lifecycle of one recording session and validates transitions.
pub struct SessionTracker {
    state: Arc<RwLock<SessionState>>,
    state_tx: Sender<SessionState>,
    state_rx: Receiver<SessionState>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(SessionState::Idle)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: SessionState) -> Result<(), SessionError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (SessionState::Idle, SessionState::Starting)
                | (SessionState::Starting, SessionState::Recording)
                | (SessionState::Starting, SessionState::Failed { .. })
                | (SessionState::Recording, SessionState::Stopping)
                | (SessionState::Recording, SessionState::Failed { .. })
                | (SessionState::Stopping, SessionState::Complete)
        );

        if !valid {
            return Err(SessionError::InvalidTransition(format!(
                "{:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::debug!("Session state: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<SessionState> {
        self.state_rx.clone()
    }
}
