/// Text shown to the user when a sign-in attempt fails without a backend explanation.
pub const GENERIC_AUTH_FAILURE: &str = "Authentication failed. Please try again.";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Durable storage could not be read or written. Never fatal.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Backend registration did not produce an application token.
    ///
    /// `detail` is for logs; `message` is the backend's own user-facing
    /// explanation when it sent one.
    #[error("Registration failed: {detail}")]
    RegistrationFailed {
        detail: String,
        message: Option<String>,
    },

    /// Persisted session is half-formed (profile without token or the reverse).
    #[error("Invalid persisted session: {0}")]
    InvalidPersistedState(String),

    /// Provider event older than one already applied.
    #[error("Identity event {sequence} arrived after event {last}")]
    ProviderEventOutOfOrder { sequence: u64, last: u64 },

    /// Identity provider operation failed (credential fetch, sign-out).
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// MedicSense backend call other than registration failed (e.g. logout).
    #[error("Backend error: {0}")]
    Backend(String),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Shorthand for a registration failure with no user-facing message.
    pub(crate) fn registration(detail: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            detail: detail.into(),
            message: None,
        }
    }

    /// Collapses any error raised during a sign-in attempt into `RegistrationFailed`.
    #[must_use]
    pub fn into_registration_failure(self) -> Self {
        match self {
            Self::RegistrationFailed { .. } => self,
            other => Self::registration(other.to_string()),
        }
    }

    /// Message safe to show in the UI. Technical detail never leaks here.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::RegistrationFailed {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message,
            _ => GENERIC_AUTH_FAILURE,
        }
    }
}
