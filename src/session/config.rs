use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::storage::FileStorage;
use crate::store::SessionStore;

/// Session controller settings.
///
/// Every field has a default. Override with `with_*` methods, or use
/// [`from_env()`](SessionConfig::from_env).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) registration_timeout: Duration,
    pub(crate) provider_ready_timeout: Duration,
    pub(crate) purge_user_data_on_sign_out: bool,
    pub(crate) storage_path: Option<PathBuf>,
    pub(crate) user_data_keys: Option<Vec<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            registration_timeout: Duration::from_secs(5),
            provider_ready_timeout: Duration::from_secs(5),
            purge_user_data_on_sign_out: true,
            storage_path: None,
            user_data_keys: None,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `MEDICSENSE_REGISTRATION_TIMEOUT_MS`: bound on one sign-in attempt
    /// - `MEDICSENSE_PROVIDER_READY_TIMEOUT_MS`: wait for the provider's first report
    /// - `MEDICSENSE_STORAGE_PATH`: JSON file for the persisted session (in-memory if unset)
    /// - `MEDICSENSE_USER_DATA_KEYS`: comma-separated cache keys purged on sign-out
    /// - `MEDICSENSE_KEEP_USER_DATA`: `"1"` or `"true"` to keep those caches on sign-out
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a duration is not a whole number of milliseconds.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(timeout) = duration_ms_env("MEDICSENSE_REGISTRATION_TIMEOUT_MS")? {
            config = config.with_registration_timeout(timeout);
        }
        if let Some(timeout) = duration_ms_env("MEDICSENSE_PROVIDER_READY_TIMEOUT_MS")? {
            config = config.with_provider_ready_timeout(timeout);
        }
        if let Ok(path) = std::env::var("MEDICSENSE_STORAGE_PATH") {
            config = config.with_storage_path(path);
        }
        if let Ok(keys) = std::env::var("MEDICSENSE_USER_DATA_KEYS") {
            config = config.with_user_data_keys(
                keys.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect(),
            );
        }
        let keep_user_data = matches!(
            std::env::var("MEDICSENSE_KEEP_USER_DATA").as_deref(),
            Ok("1") | Ok("true"),
        );

        Ok(config.with_purge_user_data_on_sign_out(!keep_user_data))
    }

    #[must_use]
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_provider_ready_timeout(mut self, timeout: Duration) -> Self {
        self.provider_ready_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_purge_user_data_on_sign_out(mut self, purge: bool) -> Self {
        self.purge_user_data_on_sign_out = purge;
        self
    }

    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_user_data_keys(mut self, keys: Vec<String>) -> Self {
        self.user_data_keys = Some(keys);
        self
    }

    #[must_use]
    pub fn registration_timeout(&self) -> Duration {
        self.registration_timeout
    }

    #[must_use]
    pub fn provider_ready_timeout(&self) -> Duration {
        self.provider_ready_timeout
    }

    /// Build the session store this config describes: file-backed when a
    /// storage path is set, in-memory otherwise.
    #[must_use]
    pub fn open_store(&self) -> SessionStore {
        let store = match &self.storage_path {
            Some(path) => SessionStore::new(FileStorage::new(path)),
            None => SessionStore::in_memory(),
        };
        match &self.user_data_keys {
            Some(keys) => store.with_user_data_keys(keys.clone()),
            None => store,
        }
    }
}

/// Reads an optional millisecond duration from the environment.
pub(crate) fn duration_ms_env(name: &str) -> Result<Option<Duration>, Error> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SessionProfile;
    use crate::types::ApplicationToken;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.registration_timeout(), Duration::from_secs(5));
        assert_eq!(config.provider_ready_timeout(), Duration::from_secs(5));
        assert!(config.purge_user_data_on_sign_out);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn overrides() {
        let config = SessionConfig::new()
            .with_registration_timeout(Duration::from_millis(750))
            .with_purge_user_data_on_sign_out(false)
            .with_user_data_keys(vec!["a".into()]);
        assert_eq!(config.registration_timeout(), Duration::from_millis(750));
        assert!(!config.purge_user_data_on_sign_out);
        assert_eq!(config.user_data_keys.as_deref(), Some(&["a".to_string()][..]));
    }

    #[test]
    fn open_store_uses_storage_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new().with_storage_path(dir.path().join("session.json"));

        let profile = SessionProfile::new("uid-1".parse().unwrap());
        let token = ApplicationToken::parse("t").unwrap();
        config.open_store().save(&profile, &token).unwrap();

        let (p, t) = config.open_store().load();
        assert_eq!(p, Some(profile));
        assert_eq!(t, Some(token));
    }

    #[test]
    fn duration_env_parsing() {
        // Name unique to this test; nothing else reads it.
        let name = "MEDICSENSE_TEST_DURATION_MS_PARSING";
        assert_eq!(duration_ms_env(name).unwrap(), None);

        unsafe { std::env::set_var(name, "250") };
        assert_eq!(duration_ms_env(name).unwrap(), Some(Duration::from_millis(250)));

        unsafe { std::env::set_var(name, "soon") };
        assert!(matches!(duration_ms_env(name), Err(Error::Config(_))));

        unsafe { std::env::remove_var(name) };
    }
}
