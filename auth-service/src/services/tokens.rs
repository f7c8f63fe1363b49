//! Bearer-token signing and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::{Key, KeyType};
use crate::services::error::AuthError;

/// Stateless signer/verifier over a shared symmetric secret.
#[derive(Clone)]
pub struct Tokenizer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    jti: String,
    sub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    usr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    dom: String,
    typ: u32,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

impl Tokenizer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign the claims of `key` into a compact token.
    pub fn issue(&self, key: &Key) -> Result<String, AuthError> {
        let claims = Claims {
            jti: key.id.clone(),
            sub: key.subject.clone(),
            usr: key.user.clone(),
            dom: key.domain.clone(),
            typ: key.key_type as u32,
            iat: key.issued_at.timestamp(),
            exp: key.expires_at.map(|t| t.timestamp()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Malformed(e.to_string()))
    }

    /// Verify signature and expiry, rebuilding the key from the claims.
    ///
    /// Elapsed expiry yields `KeyExpired`; every other defect, including an
    /// unknown type tag, yields `Authentication`.
    pub fn parse(&self, token: &str) -> Result<Key, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // exp is optional: recovery keys are issued without one
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::KeyExpired,
                _ => AuthError::Authentication,
            }
        })?;

        Self::key_from_claims(data.claims)
    }

    /// Claims of a well-signed token whose expiry has already elapsed.
    ///
    /// Used for the best-effort removal of expired API keys; anything that
    /// fails signature or shape checks yields `None`.
    pub(crate) fn parse_expired(&self, token: &str) -> Option<Key> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation).ok()?;
        Self::key_from_claims(data.claims).ok()
    }

    fn key_from_claims(claims: Claims) -> Result<Key, AuthError> {
        let key_type = KeyType::try_from(claims.typ).map_err(|_| AuthError::Authentication)?;
        Ok(Key {
            id: claims.jti,
            key_type,
            issuer: String::new(),
            subject: claims.sub,
            user: claims.usr,
            domain: claims.dom,
            issued_at: DateTime::from_timestamp(claims.iat, 0).unwrap_or_else(Utc::now),
            expires_at: claims.exp.and_then(|t| DateTime::from_timestamp(t, 0)),
        })
    }
}
