use std::future::Future;

use crate::error::Error;
use crate::profile::SessionProfile;
use crate::types::{ApplicationToken, Credential};

/// Backend step that mints an application token for a verified identity.
///
/// Implementations make a single attempt and never retry. Every failure
/// should surface as [`Error::RegistrationFailed`]; the controller normalizes
/// anything else to it anyway.
pub trait Registrar: Send + Sync + 'static {
    /// Exchange a provider identity + credential for an application token.
    fn register(
        &self,
        profile: &SessionProfile,
        credential: &Credential,
    ) -> impl Future<Output = Result<ApplicationToken, Error>> + Send;

    /// Tell the backend a token is no longer in use. Best effort.
    fn release(&self, _token: &ApplicationToken) -> impl Future<Output = Result<(), Error>> + Send {
        std::future::ready(Ok(()))
    }
}

/// Checks the preconditions shared by every registrar before any network call.
///
/// # Errors
///
/// Returns [`Error::RegistrationFailed`] for an expired or blank credential.
pub fn check_credential(credential: &Credential) -> Result<(), Error> {
    if credential.is_expired() {
        return Err(Error::registration("provider credential is expired"));
    }
    Ok(())
}
