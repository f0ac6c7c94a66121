use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    models::{Role, User},
    repository::RepositoryState,
};

const RESET_PURPOSE: &str = "password_reset";
const RESET_TOKEN_MINUTES: i64 = 15;

/// AuthError
///
/// Every way a credential can be refused. The display strings are the messages
/// returned to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Access token required")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    ExpiredToken,
    #[error("User not found")]
    UserNotFound,
    #[error("User account is inactive")]
    Inactive,
    #[error("Invalid or expired reset token")]
    InvalidResetToken,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Hashing(_) | AuthError::Signing(_) => AppError::Internal(err.to_string()),
            AuthError::InvalidResetToken => AppError::BadRequest(err.to_string()),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

/// Claims
///
/// Payload of the access tokens this service issues. `jti` names the session row that
/// keeps the token alive; deleting the row revokes the token before `exp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Token id, matched against `user_sessions.token_id`.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a password-reset token. Never accepted as an access token.
#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    sub: Uuid,
    purpose: String,
    iat: i64,
    exp: i64,
}

/// IssuedToken
///
/// A freshly signed access token plus the values its session row is keyed by.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// issue_token
///
/// Signs an HS256 access token for `user` valid for `jwt_expires_in_hours`.
pub fn issue_token(config: &AppConfig, user: &User) -> Result<IssuedToken, AuthError> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(config.jwt_expires_in_hours);
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        jti: Uuid::new_v4(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))?;

    Ok(IssuedToken {
        token,
        token_id: claims.jti,
        expires_at,
    })
}

/// decode_token
///
/// Verifies the signature and expiry of an access token.
pub fn decode_token(config: &AppConfig, token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::InvalidToken,
    })
}

/// start_session
///
/// Issues a token for `user` and records its session. Returns the encoded token.
pub async fn start_session(repo: &RepositoryState, config: &AppConfig, user: &User) -> AppResult<String> {
    let issued = issue_token(config, user)?;
    repo.create_session(user.id, issued.token_id, issued.expires_at)
        .await?;
    Ok(issued.token)
}

/// The reset-token signing key: the JWT secret followed by the account's current
/// password hash. Once the password changes, every earlier reset token stops verifying.
fn reset_key(config: &AppConfig, user: &User) -> Vec<u8> {
    let mut key = config.jwt_secret.as_bytes().to_vec();
    key.extend_from_slice(user.password_hash.as_deref().unwrap_or_default().as_bytes());
    key
}

/// Signs a short-lived token that authorizes one password reset for `user`.
pub fn issue_reset_token(config: &AppConfig, user: &User) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = ResetClaims {
        sub: user.id,
        purpose: RESET_PURPOSE.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(RESET_TOKEN_MINUTES)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&reset_key(config, user)),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Reads the account id a reset token names, checking only its expiry and purpose.
/// The signature is checked by `verify_reset_token` once the account is loaded.
pub fn reset_token_subject(token: &str) -> Result<Uuid, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();

    let claims = decode::<ResetClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|_| AuthError::InvalidResetToken)?
        .claims;
    if claims.purpose != RESET_PURPOSE {
        return Err(AuthError::InvalidResetToken);
    }
    Ok(claims.sub)
}

/// Verifies a reset token against `user`'s current password hash.
pub fn verify_reset_token(config: &AppConfig, token: &str, user: &User) -> Result<(), AuthError> {
    let claims = decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(&reset_key(config, user)),
        &Validation::default(),
    )
    .map_err(|_| AuthError::InvalidResetToken)?
    .claims;

    if claims.purpose != RESET_PURPOSE || claims.sub != user.id {
        return Err(AuthError::InvalidResetToken);
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request. Handlers use it for ownership
/// checks and for role gates via `require`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    /// Session the request's token belongs to. `None` for the local `x-user-id` bypass.
    pub token_id: Option<Uuid>,
}

impl AuthUser {
    fn from_user(user: User, token_id: Option<Uuid>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            token_id,
        }
    }

    /// Fails with 403 unless the caller's role is at least `role`.
    pub fn require(&self, role: Role) -> AppResult<()> {
        if self.role.at_least(role) {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }

    /// True for the owner of a resource and for editors and admins.
    pub fn can_manage(&self, owner: Uuid) -> bool {
        self.id == owner || self.role.at_least(Role::Editor)
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local Bypass: in `Env::Local` an `x-user-id` header naming an existing user
///    authenticates the request.
/// 2. Token Validation: Bearer token extraction and JWT decoding.
/// 3. Session Check: the token's `jti` must still have a session row.
/// 4. DB Lookup: the user must exist and be active.
///
/// Rejection: 401 with the JSON error envelope.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    if !user.is_active {
                        return Err(AuthError::Inactive.into());
                    }
                    return Ok(AuthUser::from_user(user, None));
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = decode_token(&config, token)?;

        if !repo.session_active(claims.jti).await? {
            return Err(AuthError::InvalidToken.into());
        }

        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::Inactive.into());
        }

        Ok(AuthUser::from_user(user, Some(claims.jti)))
    }
}

/// MaybeAuthUser
///
/// Optional identity for public endpoints that show more to signed-in callers. A
/// missing or unusable credential yields `None` instead of rejecting the request.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(AuthUser::from_request_parts(parts, state).await.ok()))
    }
}

/// ClientIp
///
/// Best-effort client address: the first `x-forwarded-for` hop, then `x-real-ip`,
/// then the socket peer when the server was started with connect info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.split(',').next().unwrap_or_default().trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let ip = header_value("x-forwarded-for")
            .or_else(|| header_value("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ClientIp(ip))
    }
}
