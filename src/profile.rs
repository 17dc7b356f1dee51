use serde::{Deserialize, Serialize};

use crate::types::SubjectId;

const AVATAR_PLACEHOLDER_BASE: &str = "https://ui-avatars.com/api/";

/// Authenticated identity as reported by the identity provider.
///
/// An immutable snapshot: every identity event replaces it wholesale.
/// Serialized with the field names the web front end has always persisted
/// (`uid`, `displayName`, `photoURL`, ...), and also reads the `id`/`name`
/// shape written by the older email-login path.
///
/// ```rust
/// use medicsense_session::SessionProfile;
///
/// let profile = SessionProfile::new("uid-42".parse()?)
///     .with_email("ada@example.com");
/// assert_eq!(profile.display_label(), "ada");
/// # Ok::<(), medicsense_session::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SessionProfile {
    #[serde(rename = "uid", alias = "subjectId", alias = "id")]
    pub subject_id: SubjectId,
    #[serde(
        rename = "displayName",
        alias = "name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        rename = "photoURL",
        alias = "avatarUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<String>,
    #[serde(
        rename = "phoneNumber",
        alias = "phone",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,
}

impl SessionProfile {
    /// Create a profile with only the required subject id.
    #[must_use]
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            display_name: None,
            email: None,
            avatar_url: None,
            phone_number: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// True when both snapshots describe the same provider account.
    #[must_use]
    pub fn same_subject(&self, other: &Self) -> bool {
        self.subject_id == other.subject_id
    }

    /// Name to greet the user with.
    ///
    /// Falls back to the email local part, then the phone number, then `"User"`.
    #[must_use]
    pub fn display_label(&self) -> &str {
        if let Some(name) = non_blank(self.display_name.as_deref()) {
            return name;
        }
        if let Some(local) = non_blank(self.email.as_deref())
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
        {
            return local;
        }
        non_blank(self.phone_number.as_deref()).unwrap_or("User")
    }

    /// Secondary line under the name: email, else phone, else `"No email"`.
    #[must_use]
    pub fn contact_label(&self) -> &str {
        non_blank(self.email.as_deref())
            .or_else(|| non_blank(self.phone_number.as_deref()))
            .unwrap_or("No email")
    }

    /// Avatar URL, or a generated initials placeholder.
    #[must_use]
    pub fn avatar_or_placeholder(&self) -> String {
        if let Some(url) = non_blank(self.avatar_url.as_deref()) {
            return url.to_owned();
        }
        let name = urlencoding::encode(self.display_label());
        format!("{AVATAR_PLACEHOLDER_BASE}?name={name}&background=667eea&color=fff&bold=true")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
