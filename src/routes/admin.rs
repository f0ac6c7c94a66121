use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Routes restricted to editors and admins. `create_router` wraps this router in a
/// layer that authenticates the caller and rejects anyone below `editor` with 403.
/// Endpoints that need full admin rights (user listing and deletion, blog settings)
/// check for `admin` again in the handler.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- User management ---
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/{id}",
            put(handlers::users::update_user).delete(handlers::users::delete_user),
        )
        // --- Scheduled publishing ---
        // POST /posts/scheduled/publish
        // For an external cron when the in-process scheduler is disabled.
        .route("/posts/scheduled/ready", get(handlers::posts::scheduled_ready))
        .route("/posts/scheduled/publish", post(handlers::posts::publish_scheduled))
        // --- Taxonomy management ---
        .route("/categories", post(handlers::taxonomy::create_category))
        .route(
            "/categories/{id}",
            put(handlers::taxonomy::update_category).delete(handlers::taxonomy::delete_category),
        )
        .route("/tags", post(handlers::taxonomy::create_tag))
        .route(
            "/tags/{id}",
            put(handlers::taxonomy::update_tag).delete(handlers::taxonomy::delete_tag),
        )
        // --- Comment moderation ---
        .route("/comments/{id}/moderate", post(handlers::comments::moderate_comment))
        .route("/comments/{id}/moderation", get(handlers::comments::moderation_history))
        // --- Site settings ---
        .route("/blog-settings", put(handlers::settings::update_settings))
}
