//! Asgardeo ID-token exchange.
//!
//! The identity provider's signature is not verified: the token is decoded, its
//! claims checked, and the caller is then issued one of this service's own tokens.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::config::AsgardeoConfig;
use crate::error::AppError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SsoError {
    #[error("Invalid token format")]
    Malformed,
    #[error("Token missing email/username claim")]
    MissingEmail,
    #[error("Invalid token issuer")]
    InvalidIssuer,
    #[error("Token has expired")]
    Expired,
}

impl From<SsoError> for AppError {
    fn from(err: SsoError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// Audience may be a single string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::One(aud) => aud == client_id,
            Audience::Many(list) => list.iter().any(|aud| aud == client_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    email: Option<String>,
    username: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    aud: Option<Audience>,
    iss: Option<String>,
    exp: Option<i64>,
}

/// SsoIdentity
///
/// The account details extracted from a validated ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoIdentity {
    pub subject: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Reads the payload segment of a compact JWS without checking its signature.
fn decode_unverified(token: &str) -> Result<RawClaims, SsoError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(SsoError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| SsoError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| SsoError::Malformed)
}

/// validate_id_token
///
/// Decodes `id_token` and checks its claims:
/// * an `email` (or `username`) claim must be present;
/// * `iss`, when present, must be an `asgardeo.io` issuer;
/// * `exp`, when present, must lie in the future.
///
/// An `aud` that does not name the configured client id is logged but accepted.
pub fn validate_id_token(config: &AsgardeoConfig, id_token: &str) -> Result<SsoIdentity, SsoError> {
    let claims = decode_unverified(id_token)?;

    let email = claims
        .email
        .or(claims.username)
        .filter(|email| !email.trim().is_empty())
        .ok_or(SsoError::MissingEmail)?;

    if let (Some(aud), Some(client_id)) = (&claims.aud, &config.client_id) {
        if !aud.contains(client_id) {
            tracing::warn!(expected = %client_id, got = ?aud, "Asgardeo token audience mismatch");
        }
    }

    if claims.iss.as_deref().is_some_and(|iss| !iss.contains("asgardeo.io")) {
        return Err(SsoError::InvalidIssuer);
    }

    if claims.exp.is_some_and(|exp| exp < Utc::now().timestamp()) {
        return Err(SsoError::Expired);
    }

    let local_part = email.split('@').next().unwrap_or(&email).to_string();
    Ok(SsoIdentity {
        subject: claims.sub.unwrap_or_else(|| email.clone()),
        first_name: claims
            .given_name
            .filter(|name| !name.is_empty())
            .unwrap_or(local_part),
        last_name: claims.family_name.unwrap_or_default(),
        email,
    })
}

/// username_base
///
/// Derives a username from an email's local part: characters outside
/// `[A-Za-z0-9_.-]` become `_`, the result is cut to 24 characters and padded to at
/// least 3.
pub fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut name: String = local
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(24)
        .collect();
    while name.len() < 3 {
        name.push('_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"provider-secret"),
        )
        .unwrap()
    }

    fn config() -> AsgardeoConfig {
        AsgardeoConfig {
            base_url: None,
            client_id: Some("client-123".into()),
        }
    }

    #[test]
    fn accepts_valid_asgardeo_token() {
        let exp = Utc::now().timestamp() + 600;
        let identity = validate_id_token(
            &config(),
            &token(json!({
                "sub": "asg-1",
                "email": "jane.doe@example.com",
                "given_name": "Jane",
                "iss": "https://api.asgardeo.io/t/org/oauth2/token",
                "aud": "someone-else",
                "exp": exp
            })),
        )
        .unwrap();

        assert_eq!(identity.subject, "asg-1");
        assert_eq!(identity.email, "jane.doe@example.com");
        assert_eq!(identity.first_name, "Jane");
        assert_eq!(identity.last_name, "");
    }

    #[test]
    fn falls_back_to_username_claim() {
        let identity = validate_id_token(
            &config(),
            &token(json!({ "sub": "asg-2", "username": "sam@example.com" })),
        )
        .unwrap();
        assert_eq!(identity.email, "sam@example.com");
        assert_eq!(identity.first_name, "sam");
    }

    #[test]
    fn rejects_missing_email_foreign_issuer_and_expiry() {
        assert_eq!(
            validate_id_token(&config(), &token(json!({ "sub": "x" }))),
            Err(SsoError::MissingEmail)
        );
        assert_eq!(
            validate_id_token(
                &config(),
                &token(json!({ "email": "a@b.io", "iss": "https://evil.example.com" }))
            ),
            Err(SsoError::InvalidIssuer)
        );
        assert_eq!(
            validate_id_token(
                &config(),
                &token(json!({ "email": "a@b.io", "exp": Utc::now().timestamp() - 10 }))
            ),
            Err(SsoError::Expired)
        );
        assert_eq!(validate_id_token(&config(), "garbage"), Err(SsoError::Malformed));
    }

    #[test]
    fn username_base_sanitizes_local_part() {
        assert_eq!(username_base("jane.doe+blog@example.com"), "jane.doe_blog");
        assert_eq!(username_base("x@example.com"), "x__");
    }
}
