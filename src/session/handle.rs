use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use super::state::SessionState;
use crate::profile::SessionProfile;
use crate::provider::Input;
use crate::types::ApplicationToken;

/// Read side of a running [`SessionController`](super::SessionController).
///
/// Cheap to clone. Queries return snapshots; the controller stays the only
/// writer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: watch::Receiver<SessionState>,
    inputs: mpsc::UnboundedSender<Input>,
    task: AbortHandle,
}

impl SessionHandle {
    pub(super) fn new(
        state: watch::Receiver<SessionState>,
        inputs: mpsc::UnboundedSender<Input>,
        task: AbortHandle,
    ) -> Self {
        Self {
            state,
            inputs,
            task,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn profile(&self) -> Option<SessionProfile> {
        self.state.borrow().profile().cloned()
    }

    /// Application token for backend API calls.
    #[must_use]
    pub fn token(&self) -> Option<ApplicationToken> {
        self.state.borrow().token().cloned()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Only an anonymous session gets the login prompt.
    #[must_use]
    pub fn should_show_login_prompt(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Anonymous)
    }

    /// Receiver that observes every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    ///
    /// Returns `None` if the controller stopped first.
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&SessionState) -> bool,
    ) -> Option<SessionState> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }

    /// Sign the user out: provider sign-out, local session cleared.
    ///
    /// Wins over a registration in flight. Returns `false` if the controller
    /// has stopped.
    pub fn sign_out(&self) -> bool {
        self.inputs.send(Input::SignOut).is_ok()
    }

    /// Stop the controller loop. The last published state stays readable.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}
