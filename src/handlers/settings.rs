use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppResult, ErrorBody},
    models::{Role, SettingsResponse, SettingsUpdatedResponse, UpdateSettingsRequest},
    validation::Validated,
};

/// get_settings
///
/// [Public Route] Site title and description. The row is created with defaults on
/// first read.
#[utoipa::path(
    get,
    path = "/api/blog-settings",
    responses((status = 200, description = "Current settings", body = SettingsResponse))
)]
pub async fn get_settings(State(state): State<AppState>) -> AppResult<Json<SettingsResponse>> {
    let settings = state.repo.get_settings().await?;
    Ok(Json(SettingsResponse { settings }))
}

/// update_settings
///
/// [Admin Route] Admins only.
#[utoipa::path(
    put,
    path = "/api/blog-settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Updated", body = SettingsUpdatedResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 403, description = "Not an admin", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_settings(
    user: AuthUser,
    State(state): State<AppState>,
    Validated(payload): Validated<UpdateSettingsRequest>,
) -> AppResult<Json<SettingsUpdatedResponse>> {
    user.require(Role::Admin)?;

    let description = payload
        .blog_description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    let settings = state
        .repo
        .update_settings(payload.blog_title.trim().to_string(), description, user.id)
        .await?;

    tracing::info!(updated_by = %user.id, "Blog settings updated");
    Ok(Json(SettingsUpdatedResponse {
        settings,
        message: "Blog settings updated successfully".to_string(),
    }))
}
