use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::error::Error;
use crate::profile::SessionProfile;
use crate::types::Credential;

/// External identity provider (Firebase-style).
///
/// The controller calls [`subscribe`](Self::subscribe) exactly once when it
/// starts. The provider must then report the current session through the sink
/// at least once (possibly as signed out), and again after every sign-in,
/// sign-out and token refresh.
///
/// # Example
///
/// ```rust,ignore
/// impl IdentityProvider for FirebaseBridge {
///     fn subscribe(&self, sink: IdentitySink) {
///         self.on_auth_state_changed(move |user| match user {
///             Some(user) => { sink.signed_in(user.profile(), user.id_token_source()); }
///             None => { sink.signed_out(); }
///         });
///     }
///
///     async fn sign_out(&self) -> Result<(), Error> {
///         self.auth.sign_out().await.map_err(|e| Error::Provider(e.to_string()))
///     }
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    /// Register the single session-change subscription.
    fn subscribe(&self, sink: IdentitySink);

    /// End the provider-side session. Used for forced rollback and user logout.
    fn sign_out(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Lazily fetches the provider credential for the signed-in user.
///
/// Only invoked when a registration is actually attempted. Implemented for
/// async closures and for a ready-made [`Credential`].
pub trait CredentialSource: Send + Sync + 'static {
    fn credential(&self) -> impl Future<Output = Result<Credential, Error>> + Send;
}

impl<F, Fut> CredentialSource for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Credential, Error>> + Send,
{
    fn credential(&self) -> impl Future<Output = Result<Credential, Error>> + Send {
        self()
    }
}

impl CredentialSource for Credential {
    fn credential(&self) -> impl Future<Output = Result<Credential, Error>> + Send {
        std::future::ready(Ok(self.clone()))
    }
}

/// Object-safe wrapper for `CredentialSource` (needed for `Arc<dyn>`).
pub(crate) trait CredentialSourceDyn: Send + Sync {
    fn credential_dyn(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Credential, Error>> + Send + '_>>;
}

impl<T: CredentialSource> CredentialSourceDyn for T {
    fn credential_dyn(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Credential, Error>> + Send + '_>> {
        Box::pin(self.credential())
    }
}

/// Normalized session-change notification.
#[derive(Clone)]
pub struct IdentityEvent {
    pub(crate) sequence: u64,
    pub(crate) identity: Option<SignedIn>,
}

#[derive(Clone)]
pub(crate) struct SignedIn {
    pub(crate) profile: SessionProfile,
    pub(crate) credentials: Arc<dyn CredentialSourceDyn>,
}

impl IdentityEvent {
    /// Emission order, starting at 1.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Reported profile, `None` for signed out.
    #[must_use]
    pub fn profile(&self) -> Option<&SessionProfile> {
        self.identity.as_ref().map(|s| &s.profile)
    }
}

impl std::fmt::Debug for IdentityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityEvent")
            .field("sequence", &self.sequence)
            .field("subject", &self.profile().map(|p| p.subject_id.as_str()))
            .finish()
    }
}

/// Inputs consumed by the controller loop.
#[derive(Debug)]
pub(crate) enum Input {
    Identity(IdentityEvent),
    /// User-initiated sign-out from the application.
    SignOut,
}

/// Handle the provider pushes session changes into.
///
/// Cheap to clone; all clones share one sequence counter.
#[derive(Clone)]
pub struct IdentitySink {
    inputs: mpsc::UnboundedSender<Input>,
    sequence: Arc<AtomicU64>,
}

impl IdentitySink {
    pub(crate) fn new(inputs: mpsc::UnboundedSender<Input>) -> Self {
        Self {
            inputs,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Report a signed-in user. Returns `false` once the controller has stopped.
    pub fn signed_in(&self, profile: SessionProfile, credentials: impl CredentialSource) -> bool {
        self.emit(Some(SignedIn {
            profile,
            credentials: Arc::new(credentials),
        }))
    }

    /// Report that nobody is signed in. Returns `false` once the controller has stopped.
    pub fn signed_out(&self) -> bool {
        self.emit(None)
    }

    fn emit(&self, identity: Option<SignedIn>) -> bool {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = IdentityEvent { sequence, identity };
        tracing::debug!(?event, "Identity event");
        self.inputs.send(Input::Identity(event)).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn emit_with_sequence(&self, sequence: u64, profile: Option<SessionProfile>) -> bool {
        let identity = profile.map(|profile| SignedIn {
            profile,
            credentials: Arc::new(Credential::new("test-credential")),
        });
        self.inputs
            .send(Input::Identity(IdentityEvent { sequence, identity }))
            .is_ok()
    }
}

impl std::fmt::Debug for IdentitySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySink")
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
