#![doc = include_str!("../README.md")]

#[cfg(feature = "http")]
pub mod backend;
pub mod error;
pub mod hooks;
pub mod profile;
pub mod provider;
pub mod registration;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use backend::{BackendClient, BackendConfig};
pub use error::Error;
pub use hooks::{ChannelHooks, NoopHooks, SessionHooks, UiNotification};
pub use profile::SessionProfile;
pub use provider::{CredentialSource, IdentityEvent, IdentityProvider, IdentitySink};
pub use registration::Registrar;
pub use session::{SessionConfig, SessionController, SessionHandle, SessionState, SessionStatus};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::SessionStore;
pub use types::{ApplicationToken, Credential, SubjectId};
