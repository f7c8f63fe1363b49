//! Credential model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key type tags. The integer values are part of the token wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum KeyType {
    /// Short-lived login key.
    Access = 0,
    /// Key used to re-issue an access pair.
    Refresh = 1,
    /// Long-lived, persisted and revocable key.
    Api = 2,
    /// Password-reset key, issued without a caller token.
    Recovery = 3,
    /// Key carried inside domain invitations.
    Invitation = 4,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Access => "access",
            KeyType::Refresh => "refresh",
            KeyType::Api => "api",
            KeyType::Recovery => "recovery",
            KeyType::Invitation => "invitation",
        }
    }
}

impl TryFrom<u32> for KeyType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeyType::Access),
            1 => Ok(KeyType::Refresh),
            2 => Ok(KeyType::Api),
            3 => Ok(KeyType::Recovery),
            4 => Ok(KeyType::Invitation),
            other => Err(other),
        }
    }
}

/// An issued credential.
///
/// Only API keys are persisted; every other type is self-contained in the
/// signed token. `issuer` is the subject that saved the key.
#[derive(Debug, Clone)]
pub struct Key {
    pub id: String,
    pub key_type: KeyType,
    pub issuer: String,
    pub subject: String,
    pub user: String,
    pub domain: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for Key {
    fn default() -> Self {
        Self {
            id: String::new(),
            key_type: KeyType::Access,
            issuer: String::new(),
            subject: String::new(),
            user: String::new(),
            domain: String::new(),
            issued_at: Utc::now(),
            expires_at: None,
        }
    }
}

impl Key {
    /// A key is expired iff it has an expiry and it has elapsed.
    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(exp) if Utc::now() >= exp)
    }
}

/// Signed token material returned by `Issue`.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_type: String,
}

impl Token {
    pub fn new(access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            access_type: "Bearer".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn key_type_tags_are_stable() {
        assert_eq!(KeyType::Access as u32, 0);
        assert_eq!(KeyType::Refresh as u32, 1);
        assert_eq!(KeyType::Api as u32, 2);
        assert_eq!(KeyType::Recovery as u32, 3);
        assert_eq!(KeyType::Invitation as u32, 4);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(KeyType::try_from(7), Err(7));
        assert_eq!(KeyType::try_from(2), Ok(KeyType::Api));
    }

    #[test]
    fn expiry_requires_an_elapsed_deadline() {
        let mut key = Key {
            subject: "u1".to_string(),
            ..Key::default()
        };
        assert!(!key.is_expired());

        key.expires_at = Some(Utc::now() + Duration::minutes(5));
        assert!(!key.is_expired());

        key.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(key.is_expired());
    }
}
