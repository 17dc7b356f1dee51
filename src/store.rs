use std::sync::Arc;

use crate::error::Error;
use crate::profile::SessionProfile;
use crate::storage::{MemoryStorage, Storage};
use crate::types::ApplicationToken;

pub(crate) const PROFILE_KEY: &str = "medicsense_authenticated_user";
pub(crate) const TOKEN_KEY: &str = "medicsense_backend_token";

/// Profile written by the retired email-login path. Read when the canonical
/// profile key is absent.
pub(crate) const LEGACY_PROFILE_KEY: &str = "medicsense_user";

/// Keys older code paths wrote that must disappear on logout.
const LEGACY_KEYS: [&str; 3] = [
    LEGACY_PROFILE_KEY,
    "medicsense_auth_token",
    "medicsense_user_id",
];

/// User-scoped caches purged on sign-out unless configured otherwise.
pub const DEFAULT_USER_DATA_KEYS: [&str; 3] = [
    "medicsense_chat_history",
    "medicsense_appointments",
    "medicsense_symptoms",
];

/// Persisted record of who is signed in.
///
/// Mutated only by the session controller. Profile and token are written and
/// removed together; a half-written pair is reported as-is by [`load`](Self::load)
/// so the controller can reject it.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    user_data_keys: Vec<String>,
}

impl SessionStore {
    #[must_use]
    pub fn new(storage: impl Storage) -> Self {
        Self::from_shared(Arc::new(storage))
    }

    /// Use storage that is also held elsewhere (e.g. to inspect it in tests).
    #[must_use]
    pub fn from_shared(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            user_data_keys: DEFAULT_USER_DATA_KEYS.iter().map(|k| (*k).to_owned()).collect(),
        }
    }

    /// Store that forgets everything on restart.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Override the user-scoped cache keys removed by [`purge_user_data`](Self::purge_user_data).
    #[must_use]
    pub fn with_user_data_keys(mut self, keys: Vec<String>) -> Self {
        self.user_data_keys = keys;
        self
    }

    /// Persist profile and token.
    ///
    /// Both writes are always attempted; the first failure is returned.
    /// On success, legacy keys are dropped so the next load sees only the
    /// canonical layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if either write fails.
    pub fn save(&self, profile: &SessionProfile, token: &ApplicationToken) -> Result<(), Error> {
        let profile_write = serde_json::to_string(profile)
            .map_err(|e| Error::StorageUnavailable(format!("profile serialization: {e}")))
            .and_then(|json| self.storage.set(PROFILE_KEY, &json));
        let token_write = self.storage.set(TOKEN_KEY, token.as_str());
        profile_write.and(token_write)?;

        for key in LEGACY_KEYS {
            if let Err(e) = self.storage.remove(key) {
                tracing::debug!(key, error = %e, "Legacy key cleanup failed");
            }
        }
        Ok(())
    }

    /// Last persisted pair. Unreadable or malformed entries read as absent.
    #[must_use]
    pub fn load(&self) -> (Option<SessionProfile>, Option<ApplicationToken>) {
        let profile = self
            .read(PROFILE_KEY)
            .or_else(|| self.read(LEGACY_PROFILE_KEY))
            .and_then(|json| match serde_json::from_str::<SessionProfile>(&json) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed persisted profile");
                    None
                }
            });
        let token = self.read(TOKEN_KEY).and_then(ApplicationToken::parse);
        (profile, token)
    }

    /// True when the profile is only present under the legacy key, so the
    /// next [`save`](Self::save) will migrate it.
    #[must_use]
    pub fn has_legacy_profile(&self) -> bool {
        self.read(PROFILE_KEY).is_none() && self.read(LEGACY_PROFILE_KEY).is_some()
    }

    /// Remove profile, token and every legacy key.
    ///
    /// Every removal is attempted; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if any removal fails.
    pub fn clear(&self) -> Result<(), Error> {
        self.remove_all([PROFILE_KEY, TOKEN_KEY].into_iter().chain(LEGACY_KEYS))
    }

    /// Remove user-scoped caches (chat history, appointments, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if any removal fails.
    pub fn purge_user_data(&self) -> Result<(), Error> {
        self.remove_all(self.user_data_keys.iter().map(String::as_str))
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Session storage read failed");
                None
            }
        }
    }

    fn remove_all<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<(), Error> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.storage.remove(key) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("user_data_keys", &self.user_data_keys)
            .finish_non_exhaustive()
    }
}
