use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any signed-in user. The router is wrapped in the authentication layer
/// in `create_router`, so every request here carries a valid session. Role checks
/// (author+ for writing, owner-or-editor for changes) happen inside the handlers.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Session ---
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/refresh", post(handlers::auth::refresh_token))
        // --- Own account ---
        .route(
            "/users/profile",
            get(handlers::users::get_profile).put(handlers::users::update_profile),
        )
        .route("/users/change-password", post(handlers::users::change_password))
        .route("/users/{id}", get(handlers::users::get_user))
        // --- Posts ---
        .route("/posts", post(handlers::posts::create_post))
        .route(
            "/posts/{id}",
            put(handlers::posts::update_post).delete(handlers::posts::delete_post),
        )
        // POST and PUT both publish.
        .route(
            "/posts/{id}/publish",
            post(handlers::posts::publish_post).put(handlers::posts::publish_post),
        )
        .route("/posts/{id}/unpublish", post(handlers::posts::unpublish_post))
        .route("/posts/{id}/archive", post(handlers::posts::archive_post))
        .route("/posts/{id}/schedule", post(handlers::posts::schedule_post))
        .route(
            "/posts/drafts",
            get(handlers::posts::list_drafts).post(handlers::posts::save_draft),
        )
        // --- Versions ---
        .route(
            "/posts/{id}/versions",
            get(handlers::posts::list_versions).post(handlers::posts::create_version),
        )
        .route("/posts/{id}/versions/{version}", get(handlers::posts::get_version))
        .route(
            "/posts/{id}/versions/{version}/restore",
            post(handlers::posts::restore_version),
        )
        // --- Comments ---
        // New comments wait for moderation unless written by an editor.
        .route("/comments", post(handlers::comments::create_comment))
        .route(
            "/comments/{id}",
            put(handlers::comments::update_comment).delete(handlers::comments::delete_comment),
        )
        // --- Media ---
        .route("/media/upload", post(handlers::media::upload_media))
        .route(
            "/media/{id}",
            put(handlers::media::update_media).delete(handlers::media::delete_media),
        )
        .route("/media/{id}/thumbnails", post(handlers::media::generate_thumbnails))
}
