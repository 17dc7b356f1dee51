use tokio::sync::mpsc;

use crate::profile::SessionProfile;

/// UI callbacks fired by the session controller.
///
/// Fire-and-forget: the controller does not wait on them. Implementations
/// must not call back into the controller synchronously; queue work instead.
pub trait SessionHooks: Send + Sync + 'static {
    /// A profile is signed in with a valid application token.
    fn on_authenticated(&self, profile: &SessionProfile);

    /// Nobody is signed in; show the login prompt.
    fn on_anonymous(&self);

    /// Registration with the backend is in flight.
    fn on_authenticating(&self);

    /// A sign-in attempt failed; the session is back to anonymous.
    fn on_auth_error(&self, message: &str);
}

/// Hooks that ignore every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {
    fn on_authenticated(&self, _profile: &SessionProfile) {}

    fn on_anonymous(&self) {}

    fn on_authenticating(&self) {}

    fn on_auth_error(&self, _message: &str) {}
}

/// A notification delivered through [`ChannelHooks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiNotification {
    Authenticated(SessionProfile),
    Anonymous,
    Authenticating,
    AuthError(String),
}

/// Hooks that forward every notification into an unbounded channel.
///
/// Lets a UI event loop (or a test) consume notifications at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelHooks {
    tx: mpsc::UnboundedSender<UiNotification>,
}

impl ChannelHooks {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: UiNotification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("UI notification receiver dropped");
        }
    }
}

impl SessionHooks for ChannelHooks {
    fn on_authenticated(&self, profile: &SessionProfile) {
        self.send(UiNotification::Authenticated(profile.clone()));
    }

    fn on_anonymous(&self) {
        self.send(UiNotification::Anonymous);
    }

    fn on_authenticating(&self) {
        self.send(UiNotification::Authenticating);
    }

    fn on_auth_error(&self, message: &str) {
        self.send(UiNotification::AuthError(message.to_owned()));
    }
}
