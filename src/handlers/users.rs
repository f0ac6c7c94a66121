use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult, ErrorBody},
    models::{
        ChangePasswordRequest, MessageResponse, Page, Pagination, ProfileResponse, Role,
        UpdateProfileRequest, UpdateUserRequest, UserListQuery, UserResponse, UsersResponse,
    },
    validation::Validated,
};

/// list_users
///
/// [Admin Route] Paged account listing, filterable by role and a free-text search
/// over email, username and names.
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Accounts", body = UsersResponse),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<UsersResponse>> {
    user.require(Role::Admin)?;

    let page = Page::new(query.page, query.limit);
    let search = query.search.filter(|s| !s.trim().is_empty());
    let (users, total) = state.repo.list_users(query.role, search, page).await?;

    Ok(Json(UsersResponse {
        users,
        pagination: Pagination::new(page, total),
    }))
}

/// get_profile
///
/// [Authenticated Route] The caller's account joined with their profile extension.
#[utoipa::path(
    get,
    path = "/api/users/profile",
    responses((status = 200, description = "Own profile", body = ProfileResponse)),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state
        .repo
        .get_profile(user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(ProfileResponse { user: profile }))
}

/// update_profile
///
/// [Authenticated Route] Self-service edit of names, bio, avatar and the profile
/// extension (website, social links, preferences).
#[utoipa::path(
    put,
    path = "/api/users/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 400, description = "Validation failed", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Validated(payload): Validated<UpdateProfileRequest>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state
        .repo
        .update_profile(user.id, payload)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(ProfileResponse { user: profile }))
}

/// change_password
///
/// [Authenticated Route] Requires the current password. Accounts without a local
/// password (SSO-only) cannot use this endpoint.
#[utoipa::path(
    post,
    path = "/api/users/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password is incorrect", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    user: AuthUser,
    State(state): State<AppState>,
    Validated(payload): Validated<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let account = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let matches = match account.password_hash.as_deref() {
        Some(hash) => auth::verify_password(&payload.current_password, hash)?,
        None => false,
    };
    if !matches {
        return Err(AppError::BadRequest("Current password is incorrect".to_string()));
    }

    let hash = auth::hash_password(&payload.new_password)?;
    state.repo.update_password(user.id, &hash).await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// get_user
///
/// [Authenticated Route] A single account by id.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    let found = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(UserResponse { user: found }))
}

/// update_user
///
/// [Admin Route] Editor/admin edit of names, role and active flag. Only admins may
/// grant the admin role. Deactivating an account ends its sessions.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Validated(payload): Validated<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    user.require(Role::Editor)?;

    let existing = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    // Granting admin, or touching an admin account at all, takes an admin.
    if payload.role == Role::Admin || existing.role == Role::Admin {
        user.require(Role::Admin)?;
    }

    let status_changed = existing.is_active != payload.is_active;
    let updated = state
        .repo
        .update_user(id, payload)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if status_changed {
        tracing::info!(
            user_id = %updated.id,
            email = %updated.email,
            from = existing.is_active,
            to = updated.is_active,
            changed_by = %user.id,
            "Account status changed"
        );
        if !updated.is_active {
            state.repo.delete_sessions(updated.id).await?;
        }
    }

    Ok(Json(UserResponse { user: updated }))
}

/// delete_user
///
/// [Admin Route] Removes an account. Admins cannot delete themselves.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 400, description = "Own account", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    user.require(Role::Admin)?;

    if state.repo.get_user(id).await?.is_none() {
        return Err(AppError::not_found("User"));
    }
    if id == user.id {
        return Err(AppError::BadRequest("Cannot delete your own account".to_string()));
    }

    state.repo.delete_user(id).await?;
    tracing::info!(user_id = %id, deleted_by = %user.id, "User deleted");
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
