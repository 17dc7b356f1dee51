//! Session reconciliation controller.
//!
//! Keeps three sources in agreement: the identity provider's session-change
//! notifications, the session persisted in local storage, and the backend's
//! application token.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use medicsense_session::{BackendClient, BackendConfig, SessionConfig, SessionController};
//!
//! // 1. Implement IdentityProvider for your provider bridge
//! // 2. Configure from environment
//! let config = SessionConfig::from_env()?;
//! let backend = BackendClient::new(BackendConfig::from_env()?);
//!
//! // 3. Start the controller
//! let session = SessionController::new(config.clone(), provider, backend, config.open_store())
//!     .with_hooks(ui_hooks)
//!     .start();
//!
//! // 4. Query it from the UI
//! if session.should_show_login_prompt() { /* ... */ }
//! ```

pub(crate) mod config;
mod controller;
mod handle;
mod state;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use handle::SessionHandle;
pub use state::{SessionState, SessionStatus};
