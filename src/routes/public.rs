use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints open to anonymous callers. Read handlers take a `MaybeAuthUser` and show
/// signed-in users more (their own drafts, private media); visibility is enforced in
/// the handlers and the repository filters, never here.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // --- Auth gateway ---
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // Exchanges an Asgardeo ID token for a local session.
        .route("/auth/asgardeo/login", post(handlers::auth::asgardeo_login))
        .route("/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        // --- Posts ---
        // Anonymous callers only ever see published posts.
        .route("/posts", get(handlers::posts::list_posts))
        .route("/posts/slug/{slug}", get(handlers::posts::get_post_by_slug))
        .route("/posts/{id}", get(handlers::posts::get_post))
        // --- Taxonomy ---
        .route("/categories", get(handlers::taxonomy::list_categories))
        .route("/categories/slug/{slug}", get(handlers::taxonomy::get_category_by_slug))
        .route("/categories/{id}", get(handlers::taxonomy::get_category))
        .route("/categories/{id}/posts", get(handlers::taxonomy::category_posts))
        .route("/tags", get(handlers::taxonomy::list_tags))
        .route("/tags/slug/{slug}", get(handlers::taxonomy::get_tag_by_slug))
        .route("/tags/{id}", get(handlers::taxonomy::get_tag))
        .route("/tags/{id}/posts", get(handlers::taxonomy::tag_posts))
        // --- Comments ---
        .route("/comments", get(handlers::comments::list_comments))
        .route("/comments/{id}", get(handlers::comments::get_comment))
        .route("/comments/{id}/likes", get(handlers::comments::like_count))
        // POST /comments/{id}/like
        // Anonymous likes are keyed by client IP, so this stays outside the auth layer.
        .route("/comments/{id}/like", post(handlers::comments::toggle_like))
        // --- Media ---
        .route("/media", get(handlers::media::list_media))
        .route("/media/stats", get(handlers::media::media_stats))
        .route("/media/{id}", get(handlers::media::get_media))
        .route("/media/{id}/serve", get(handlers::media::serve_media))
        .route("/media/{id}/thumbnails", get(handlers::media::list_thumbnails))
        // --- Settings ---
        .route("/blog-settings", get(handlers::settings::get_settings))
}
