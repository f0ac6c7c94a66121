use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult, ErrorBody},
    models::{
        AsgardeoLoginRequest, AuthResponse, AuthUserView, ForgotPasswordRequest, LoginRequest,
        MessageResponse, NewUser, RegisterRequest, ResetPasswordRequest, Role, TokenResponse, User,
    },
    sso,
    validation::Validated,
};

const FORGOT_PASSWORD_MESSAGE: &str = "If the email exists, a password reset link has been sent";

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".to_string())
}

fn inactive_account() -> AppError {
    AppError::Unauthorized("Account is inactive".to_string())
}

async fn auth_response(state: &AppState, user: &User, message: &str) -> AppResult<AuthResponse> {
    let token = auth::start_session(&state.repo, &state.config, user).await?;
    Ok(AuthResponse {
        message: message.to_string(),
        user: AuthUserView::from(user),
        token,
    })
}

/// register
///
/// [Public Route] Creates a local account with the `reader` role and signs it in.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 409, description = "Email or username taken", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Validated(payload): Validated<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = payload.email.trim().to_lowercase();
    let username = payload.username.trim().to_string();

    if state.repo.user_exists(&email, &username).await? {
        return Err(AppError::Conflict(
            "User with this email or username already exists".to_string(),
        ));
    }

    let user = state
        .repo
        .create_user(NewUser {
            email,
            username,
            password_hash: Some(auth::hash_password(&payload.password)?),
            first_name: payload.first_name,
            last_name: payload.last_name,
            role: Role::Reader,
            ..NewUser::default()
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");
    let response = auth_response(&state, &user, "User registered successfully").await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// login
///
/// [Public Route] Password login. Unknown emails, wrong passwords and SSO-only
/// accounts all answer with the same 401.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials or inactive account", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Validated(payload): Validated<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = state
        .repo
        .find_user_by_email(&payload.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !user.is_active {
        return Err(inactive_account());
    }

    let hash = user.password_hash.as_deref().ok_or_else(invalid_credentials)?;
    if !auth::verify_password(&payload.password, hash)? {
        return Err(invalid_credentials());
    }

    Ok(Json(auth_response(&state, &user, "Login successful").await?))
}

/// asgardeo_login
///
/// [Public Route] Exchanges an Asgardeo ID token for a local session. The account is
/// found by SSO subject, then by email (and linked), and is otherwise provisioned
/// as a `reader` with a username derived from the email.
#[utoipa::path(
    post,
    path = "/api/auth/asgardeo/login",
    request_body = AsgardeoLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Token rejected or account inactive", body = ErrorBody)
    )
)]
pub async fn asgardeo_login(
    State(state): State<AppState>,
    Validated(payload): Validated<AsgardeoLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let identity = sso::validate_id_token(&state.config.asgardeo, &payload.id_token)?;
    let email = identity.email.trim().to_lowercase();

    let user = match state.repo.find_user_by_asgardeo_id(&identity.subject).await? {
        Some(user) => user,
        None => match state.repo.find_user_by_email(&email).await? {
            Some(existing) => {
                tracing::info!(user_id = %existing.id, "Linking existing account to Asgardeo");
                state
                    .repo
                    .link_asgardeo_account(existing.id, &identity.subject)
                    .await?
            }
            None => {
                let username = available_username(&state, &email).await?;
                let user = state
                    .repo
                    .create_user(NewUser {
                        email,
                        username,
                        first_name: Some(identity.first_name),
                        last_name: Some(identity.last_name).filter(|n| !n.is_empty()),
                        role: Role::Reader,
                        email_verified: true,
                        asgardeo_user_id: Some(identity.subject),
                        ..NewUser::default()
                    })
                    .await?;
                tracing::info!(user_id = %user.id, "Provisioned user from Asgardeo");
                user
            }
        },
    };

    if !user.is_active {
        return Err(inactive_account());
    }

    Ok(Json(auth_response(&state, &user, "Login successful").await?))
}

/// Picks `base`, `base1`, `base2`, … until a username is free.
async fn available_username(state: &AppState, email: &str) -> AppResult<String> {
    let base = sso::username_base(email);
    if !state.repo.username_taken(&base).await? {
        return Ok(base);
    }
    for n in 1..100 {
        let candidate = format!("{base}{n}");
        if !state.repo.username_taken(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict(
        "Could not derive a free username for this account".to_string(),
    ))
}

/// logout
///
/// [Authenticated Route] Deletes every session of the caller, revoking all of their
/// outstanding tokens.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Logged out", body = MessageResponse)),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<MessageResponse>> {
    let removed = state.repo.delete_sessions(user.id).await?;
    tracing::debug!(user_id = %user.id, removed, "Sessions cleared");
    Ok(Json(MessageResponse::new("Logout successful")))
}

/// refresh_token
///
/// [Authenticated Route] Issues a fresh token (and session) for the caller.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses((status = 200, description = "New token", body = TokenResponse)),
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<TokenResponse>> {
    let account = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let token = auth::start_session(&state.repo, &state.config, &account).await?;
    Ok(Json(TokenResponse { token }))
}

/// forgot_password
///
/// [Public Route] Answers identically whether or not the email is registered. For a
/// known account a 15-minute reset token is minted and written to the log in place of
/// an email.
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Request accepted", body = MessageResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Validated(payload): Validated<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    if let Some(user) = state.repo.find_user_by_email(&email).await? {
        if user.is_active {
            let token = auth::issue_reset_token(&state.config, &user)?;
            tracing::info!(user_id = %user.id, reset_token = %token, "Password reset requested");
        }
    }
    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

/// reset_password
///
/// [Public Route] Replaces the password of the account a reset token was issued for
/// and ends its existing sessions.
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorBody)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Validated(payload): Validated<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user_id = auth::reset_token_subject(&payload.token)?;
    let user = state
        .repo
        .get_user(user_id)
        .await?
        .ok_or(auth::AuthError::InvalidResetToken)?;
    auth::verify_reset_token(&state.config, &payload.token, &user)?;

    let hash = auth::hash_password(&payload.new_password)?;
    state.repo.update_password(user.id, &hash).await?;
    state.repo.delete_sessions(user.id).await?;

    tracing::info!(user_id = %user.id, "Password reset");
    Ok(Json(MessageResponse::new("Password reset successful")))
}
