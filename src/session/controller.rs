use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::config::SessionConfig;
use super::handle::SessionHandle;
use super::state::{Notified, SessionState};
use crate::error::Error;
use crate::hooks::{NoopHooks, SessionHooks};
use crate::profile::SessionProfile;
use crate::provider::{IdentityProvider, IdentitySink, Input, SignedIn};
use crate::registration::{Registrar, check_credential};
use crate::store::SessionStore;
use crate::types::ApplicationToken;

/// Reconciles provider notifications, persisted session data and backend
/// registration into one [`SessionState`].
///
/// Owns the state and the [`SessionStore`]; everything else observes through
/// the [`SessionHandle`] returned by [`start`](Self::start).
pub struct SessionController<P, R> {
    config: SessionConfig,
    provider: Arc<P>,
    registrar: Arc<R>,
    store: SessionStore,
    hooks: Arc<dyn SessionHooks>,
    state: SessionState,
    last_sequence: u64,
    notified: Option<Notified>,
    state_tx: watch::Sender<SessionState>,
}

impl<P: IdentityProvider, R: Registrar> SessionController<P, R> {
    #[must_use]
    pub fn new(config: SessionConfig, provider: P, registrar: R, store: SessionStore) -> Self {
        Self::from_shared(config, Arc::new(provider), Arc::new(registrar), store)
    }

    /// Like [`new`](Self::new), for a provider/registrar also held elsewhere.
    #[must_use]
    pub fn from_shared(
        config: SessionConfig,
        provider: Arc<P>,
        registrar: Arc<R>,
        store: SessionStore,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        Self {
            config,
            provider,
            registrar,
            store,
            hooks: Arc::new(NoopHooks),
            state: SessionState::Anonymous,
            last_sequence: 0,
            notified: None,
            state_tx,
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: impl SessionHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Restore the persisted session, subscribe to the provider and spawn the
    /// reconciliation loop on the current tokio runtime.
    pub fn start(mut self) -> SessionHandle {
        self.restore();

        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let state_rx = self.state_tx.subscribe();
        self.provider.subscribe(IdentitySink::new(inputs_tx.clone()));

        let task = tokio::spawn(self.run(inputs_rx));
        SessionHandle::new(state_rx, inputs_tx, task.abort_handle())
    }

    // ── Startup ────────────────────────────────────────────────────────

    fn restore(&mut self) {
        match self.store.load() {
            (Some(profile), Some(token)) => {
                tracing::info!(subject = %profile.subject_id, "Restored cached session, awaiting provider confirmation");
                if self.store.has_legacy_profile() {
                    tracing::info!(subject = %profile.subject_id, "Migrating session from legacy storage key");
                    self.persist(&profile, &token);
                }
                self.enter(SessionState::Authenticated {
                    profile,
                    token,
                    confirmed: false,
                });
            }
            (None, None) => self.enter(SessionState::Anonymous),
            (profile, _) => {
                let err = Error::InvalidPersistedState(
                    if profile.is_some() {
                        "profile without application token"
                    } else {
                        "application token without profile"
                    }
                    .into(),
                );
                tracing::warn!(error = %err, "Discarding half-written session");
                self.clear_store();
                self.enter(SessionState::Anonymous);
            }
        }
    }

    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        let mut next =
            match tokio::time::timeout(self.config.provider_ready_timeout, inputs.recv()).await {
                Ok(first) => first,
                Err(_) => {
                    tracing::warn!(
                        timeout = ?self.config.provider_ready_timeout,
                        "Identity provider has not reported yet, continuing with current session"
                    );
                    inputs.recv().await
                }
            };

        while let Some(input) = next.take() {
            next = match self.apply(input, &mut inputs).await {
                Some(deferred) => Some(deferred),
                None => inputs.recv().await,
            };
        }
        tracing::debug!("Session controller stopped");
    }

    // ── Transitions ────────────────────────────────────────────────────

    /// Process one input. Returns an input that arrived during a registration
    /// and must be handled next.
    async fn apply(
        &mut self,
        input: Input,
        inputs: &mut mpsc::UnboundedReceiver<Input>,
    ) -> Option<Input> {
        match input {
            Input::SignOut => {
                self.sign_out().await;
                None
            }
            Input::Identity(event) => {
                if let Err(err) = ensure_newer(event.sequence, self.last_sequence) {
                    tracing::debug!(error = %err, "Ignoring stale identity event");
                    return None;
                }
                self.last_sequence = event.sequence;
                match event.identity {
                    None => {
                        self.provider_signed_out();
                        None
                    }
                    Some(signed_in) => self.provider_signed_in(signed_in, inputs).await,
                }
            }
        }
    }

    fn provider_signed_out(&mut self) {
        if let Some(subject) = self.state.subject() {
            tracing::info!(subject = %subject, "Provider reported sign-out");
        }
        self.teardown();
        self.enter(SessionState::Anonymous);
    }

    async fn provider_signed_in(
        &mut self,
        signed_in: SignedIn,
        inputs: &mut mpsc::UnboundedReceiver<Input>,
    ) -> Option<Input> {
        if let SessionState::Authenticated {
            profile,
            token,
            confirmed,
        } = &self.state
        {
            if profile.same_subject(&signed_in.profile) {
                if !confirmed {
                    tracing::info!(subject = %profile.subject_id, "Provider confirmed cached session");
                }
                let token = token.clone();
                if *profile != signed_in.profile {
                    self.persist(&signed_in.profile, &token);
                }
                self.enter(SessionState::Authenticated {
                    profile: signed_in.profile,
                    token,
                    confirmed: true,
                });
                return None;
            }

            tracing::info!(
                previous = %profile.subject_id,
                next = %signed_in.profile.subject_id,
                confirmed,
                "Provider reports a different user, dropping current session"
            );
            self.teardown();
        }

        self.authenticate(signed_in, inputs).await
    }

    /// Anonymous → Authenticating → Authenticated | Anonymous.
    ///
    /// Inputs arriving while the registration is in flight are held back; the
    /// call itself is never cancelled.
    async fn authenticate(
        &mut self,
        signed_in: SignedIn,
        inputs: &mut mpsc::UnboundedReceiver<Input>,
    ) -> Option<Input> {
        let profile = signed_in.profile.clone();
        tracing::info!(subject = %profile.subject_id, "Registering provider identity with backend");
        self.enter(SessionState::Authenticating {
            profile: profile.clone(),
        });

        let attempt = register_within(
            self.registrar.clone(),
            signed_in,
            self.config.registration_timeout,
        );
        tokio::pin!(attempt);

        let mut latest: Option<Input> = None;
        let mut held_sequence = self.last_sequence;
        let mut logout_seen = false;
        let mut open = true;
        let outcome = loop {
            tokio::select! {
                outcome = &mut attempt => break outcome,
                received = inputs.recv(), if open => match received {
                    Some(input) => {
                        if let Input::Identity(event) = &input {
                            if let Err(err) = ensure_newer(event.sequence, held_sequence) {
                                tracing::debug!(error = %err, "Ignoring stale identity event");
                                continue;
                            }
                            held_sequence = event.sequence;
                        }
                        logout_seen |= is_logout(&input);
                        latest = Some(input);
                    }
                    None => open = false,
                },
            }
        };

        let superseded = logout_seen
            || latest
                .as_ref()
                .is_some_and(|input| !continues_with(input, &profile));

        if superseded {
            match outcome {
                Ok(token) => {
                    tracing::info!(subject = %profile.subject_id, "Discarding registration superseded while in flight");
                    self.release(token);
                }
                Err(err) => {
                    tracing::info!(subject = %profile.subject_id, error = %err, "Superseded registration failed");
                }
            }
            // The held-back input decides what the UI sees next.
            self.state = SessionState::Anonymous;
            return latest;
        }

        match outcome {
            Ok(token) => {
                self.persist(&profile, &token);
                tracing::info!(subject = %profile.subject_id, "Session authenticated");
                self.enter(SessionState::Authenticated {
                    profile,
                    token,
                    confirmed: true,
                });
                latest
            }
            Err(err) => {
                self.fail(profile, err).await;
                // Anything held back refers to the identity just rolled back.
                None
            }
        }
    }

    /// Roll back a failed sign-in: provider sign-out, empty store, UI error.
    async fn fail(&mut self, profile: SessionProfile, err: Error) {
        let err = err.into_registration_failure();
        let message = err.user_message().to_owned();
        tracing::warn!(subject = %profile.subject_id, error = %err, "Sign-in rolled back");

        self.state = SessionState::AuthenticationFailed {
            profile,
            message: message.clone(),
        };
        self.provider_sign_out().await;
        self.teardown();

        self.state = SessionState::Anonymous;
        self.publish();
        self.hooks.on_auth_error(&message);
        self.notified = Some(Notified::Anonymous);
    }

    /// User-initiated sign-out from the application.
    async fn sign_out(&mut self) {
        if let Some(subject) = self.state.subject() {
            tracing::info!(subject = %subject, "Signing out");
        }
        self.provider_sign_out().await;
        self.teardown();
        self.enter(SessionState::Anonymous);
    }

    // ── Effects ────────────────────────────────────────────────────────

    /// Provider sign-out, bounded by `registration_timeout`. The local session
    /// is cleared whatever the outcome.
    async fn provider_sign_out(&self) {
        let limit = self.config.registration_timeout;
        match tokio::time::timeout(limit, self.provider.sign_out()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Provider sign-out failed, clearing local session anyway");
            }
            Err(_) => {
                tracing::warn!(timeout = ?limit, "Provider sign-out did not complete, clearing local session anyway");
            }
        }
    }

    /// Drop the current session: release its token, clear storage, and purge
    /// user caches if someone was signed in. Leaves `state` Anonymous without
    /// notifying.
    fn teardown(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Anonymous);
        if let Some(token) = previous.token() {
            self.release(token.clone());
        }
        self.clear_store();
        if previous.profile().is_some() && self.config.purge_user_data_on_sign_out {
            if let Err(e) = self.store.purge_user_data() {
                tracing::warn!(error = %e, "Failed to purge user data");
            }
        }
    }

    fn persist(&self, profile: &SessionProfile, token: &ApplicationToken) {
        if let Err(e) = self.store.save(profile, token) {
            tracing::warn!(error = %e, "Session persistence failed, continuing in memory only");
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }
    }

    /// Fire-and-forget backend logout for a token that is no longer used.
    fn release(&self, token: ApplicationToken) {
        let registrar = self.registrar.clone();
        tokio::spawn(async move {
            if let Err(e) = registrar.release(&token).await {
                tracing::debug!(error = %e, "Backend token release failed");
            }
        });
    }

    /// Wake watchers only when the published state actually changes.
    fn publish(&self) {
        self.state_tx.send_if_modified(|published| {
            if *published == self.state {
                return false;
            }
            *published = self.state.clone();
            true
        });
    }

    /// Publish `state` and notify the UI if what it shows changed.
    fn enter(&mut self, state: SessionState) {
        let notification = Notified::of(&state);
        self.state = state;
        self.publish();

        if notification.is_none() || notification == self.notified {
            return;
        }
        match &self.state {
            SessionState::Anonymous => self.hooks.on_anonymous(),
            SessionState::Authenticating { .. } => self.hooks.on_authenticating(),
            SessionState::Authenticated { profile, .. } => self.hooks.on_authenticated(profile),
            SessionState::AuthenticationFailed { .. } => {}
        }
        self.notified = notification;
    }
}

fn ensure_newer(sequence: u64, last: u64) -> Result<(), Error> {
    if sequence <= last {
        return Err(Error::ProviderEventOutOfOrder { sequence, last });
    }
    Ok(())
}

fn is_logout(input: &Input) -> bool {
    match input {
        Input::SignOut => true,
        Input::Identity(event) => event.identity.is_none(),
    }
}

/// True if `input` reports the same subject the in-flight registration is for.
fn continues_with(input: &Input, profile: &SessionProfile) -> bool {
    match input {
        Input::Identity(event) => event.profile().is_some_and(|p| p.same_subject(profile)),
        Input::SignOut => false,
    }
}

/// Fetch the credential and register, bounded by `limit`.
async fn register_within<R: Registrar>(
    registrar: Arc<R>,
    signed_in: SignedIn,
    limit: Duration,
) -> Result<ApplicationToken, Error> {
    let attempt = async {
        let credential = signed_in.credentials.credential_dyn().await?;
        check_credential(&credential)?;
        registrar.register(&signed_in.profile, &credential).await
    };
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result.map_err(Error::into_registration_failure),
        Err(_) => Err(Error::registration(format!(
            "no response within {} ms",
            limit.as_millis()
        ))),
    }
}
