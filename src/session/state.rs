use crate::profile::SessionProfile;
use crate::types::{ApplicationToken, SubjectId};

/// Where the session stands, as decided by the controller.
///
/// Profile and token only ever appear together, except while
/// `Authenticating` (profile known, token not yet minted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Nobody signed in.
    Anonymous,
    /// Provider confirmed `profile`; backend registration in flight.
    Authenticating { profile: SessionProfile },
    /// Signed in with a backend token.
    ///
    /// `confirmed` is `false` while the session is only restored from storage
    /// and the provider has not reported on it yet.
    Authenticated {
        profile: SessionProfile,
        token: ApplicationToken,
        confirmed: bool,
    },
    /// Registration failed. Transient: the controller rolls back to
    /// `Anonymous` before anyone can observe it.
    AuthenticationFailed {
        profile: SessionProfile,
        message: String,
    },
}

/// Fieldless view of [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Anonymous,
    Authenticating,
    Authenticated,
    AuthenticationFailed,
}

impl SessionState {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Anonymous => SessionStatus::Anonymous,
            Self::Authenticating { .. } => SessionStatus::Authenticating,
            Self::Authenticated { .. } => SessionStatus::Authenticated,
            Self::AuthenticationFailed { .. } => SessionStatus::AuthenticationFailed,
        }
    }

    #[must_use]
    pub fn profile(&self) -> Option<&SessionProfile> {
        match self {
            Self::Anonymous => None,
            Self::Authenticating { profile }
            | Self::Authenticated { profile, .. }
            | Self::AuthenticationFailed { profile, .. } => Some(profile),
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&ApplicationToken> {
        match self {
            Self::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    #[must_use]
    pub fn subject(&self) -> Option<&SubjectId> {
        self.profile().map(|p| &p.subject_id)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Authenticated and confirmed by the provider, not just restored from storage.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Authenticated { confirmed: true, .. })
    }
}

/// Last notification sent to the UI hooks, used to suppress repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Notified {
    Anonymous,
    Authenticating,
    Authenticated(SessionProfile),
}

impl Notified {
    pub(super) fn of(state: &SessionState) -> Option<Self> {
        match state {
            SessionState::Anonymous => Some(Self::Anonymous),
            SessionState::Authenticating { .. } => Some(Self::Authenticating),
            SessionState::Authenticated { profile, .. } => Some(Self::Authenticated(profile.clone())),
            SessionState::AuthenticationFailed { .. } => None,
        }
    }
}
