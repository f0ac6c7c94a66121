use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod imaging;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod sso;
pub mod storage;
pub mod validation;

// Routers split by access level (public, authenticated, editor/admin).
pub mod routes;
use auth::AuthUser;
use error::AppResult;
use models::{MAX_UPLOAD_BYTES, MAX_UPLOAD_FILES, Role};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{LocalStorage, MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// Generated OpenAPI document for every `#[utoipa::path]` handler, served at
/// `/api-docs/openapi.json` and browsable through Swagger UI. Schemas referenced by the
/// paths are collected automatically; the list below adds the shared envelopes.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::register, handlers::auth::login, handlers::auth::asgardeo_login,
        handlers::auth::logout, handlers::auth::refresh_token, handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::users::list_users, handlers::users::get_profile, handlers::users::update_profile,
        handlers::users::change_password, handlers::users::get_user, handlers::users::update_user,
        handlers::users::delete_user,
        handlers::posts::list_posts, handlers::posts::get_post, handlers::posts::get_post_by_slug,
        handlers::posts::create_post, handlers::posts::update_post, handlers::posts::delete_post,
        handlers::posts::publish_post, handlers::posts::unpublish_post, handlers::posts::archive_post,
        handlers::posts::schedule_post, handlers::posts::list_drafts, handlers::posts::save_draft,
        handlers::posts::list_versions, handlers::posts::create_version, handlers::posts::get_version,
        handlers::posts::restore_version, handlers::posts::scheduled_ready,
        handlers::posts::publish_scheduled,
        handlers::taxonomy::list_categories, handlers::taxonomy::get_category,
        handlers::taxonomy::get_category_by_slug, handlers::taxonomy::create_category,
        handlers::taxonomy::update_category, handlers::taxonomy::delete_category,
        handlers::taxonomy::category_posts,
        handlers::taxonomy::list_tags, handlers::taxonomy::get_tag, handlers::taxonomy::get_tag_by_slug,
        handlers::taxonomy::create_tag, handlers::taxonomy::update_tag, handlers::taxonomy::delete_tag,
        handlers::taxonomy::tag_posts,
        handlers::comments::list_comments, handlers::comments::get_comment,
        handlers::comments::like_count, handlers::comments::toggle_like,
        handlers::comments::create_comment, handlers::comments::update_comment,
        handlers::comments::delete_comment, handlers::comments::moderate_comment,
        handlers::comments::moderation_history,
        handlers::media::list_media, handlers::media::media_stats, handlers::media::get_media,
        handlers::media::list_thumbnails, handlers::media::serve_media, handlers::media::upload_media,
        handlers::media::update_media, handlers::media::delete_media,
        handlers::media::generate_thumbnails,
        handlers::settings::get_settings, handlers::settings::update_settings,
    ),
    components(
        schemas(
            error::ErrorBody, models::MessageResponse, models::Pagination, models::Role,
            models::PostStatus, models::CommentStatus, models::FileType, models::ThumbnailSize,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "blog-cms", description = "Blog content management API")
    )
)]
struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by the protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single, immutable container of shared services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Object store for media bytes (local disk or S3/R2).
    pub storage: StorageState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Extractors such as `AuthUser` pull only the pieces they need out of the state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated router. Extracting `AuthUser` runs token and session
/// validation; a failure rejects the request with 401 before any handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// editor_middleware
///
/// Gate for the admin router: authenticates like `auth_middleware`, then answers 403
/// to callers below `editor`.
async fn editor_middleware(auth_user: AuthUser, request: Request, next: Next) -> AppResult<Response> {
    auth_user.require(Role::Editor)?;
    Ok(next.run(request).await)
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let origin = match frontend_url.and_then(|url| HeaderValue::from_str(url.trim_end_matches('/')).ok()) {
        Some(origin) => AllowOrigin::exact(origin),
        None => AllowOrigin::any(),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// create_router
///
/// Assembles the `/api` routers with their access layers, the documentation and
/// health endpoints, the local `/uploads` mount, and the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.frontend_url.as_deref());
    let x_request_id = HeaderName::from_static("x-request-id");

    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), editor_middleware)),
        );

    let mut base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health))
        .nest("/api", api);

    // Locally stored media is published as static files, mirroring the public URLs
    // handed out by `LocalStorage`.
    if state.config.storage.provider == config::StorageProvider::Local {
        base_router = base_router.nest_service("/uploads", ServeDir::new(&state.config.storage.upload_path));
    }

    base_router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * MAX_UPLOAD_FILES))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` assigned by
/// `SetRequestIdLayer` so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
