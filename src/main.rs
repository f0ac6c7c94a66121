use blog_cms::{
    AppState,
    auth,
    config::{AppConfig, Env},
    create_router,
    models::{NewUser, Role},
    repository::{PostgresRepository, RepositoryState},
    scheduler::PublishScheduler,
    storage,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Creates the configured admin account on first start. An existing account with
/// that email is left untouched.
async fn seed_admin(repo: &RepositoryState, config: &AppConfig) {
    let email = config.admin_email.trim().to_lowercase();
    match repo.find_user_by_email(&email).await {
        Ok(Some(_)) => tracing::debug!("Admin account present"),
        Ok(None) => {
            let password_hash = match auth::hash_password(&config.admin_password) {
                Ok(hash) => hash,
                Err(e) => {
                    tracing::error!("Failed to hash admin password: {}", e);
                    return;
                }
            };
            let admin = NewUser {
                email,
                username: "admin".to_string(),
                password_hash: Some(password_hash),
                first_name: Some("Admin".to_string()),
                last_name: Some("User".to_string()),
                role: Role::Admin,
                email_verified: true,
                ..NewUser::default()
            };
            match repo.create_user(admin).await {
                Ok(user) => tracing::info!(user_id = %user.id, "Seeded admin account"),
                Err(e) => tracing::error!("Failed to seed admin account: {}", e),
            }
        }
        Err(e) => tracing::error!("Failed to look up admin account: {}", e),
    }
}

/// main
///
/// Entry point: configuration, logging, database and migrations, storage, the
/// optional publish scheduler and the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fails fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise crate-level debug output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blog_cms=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;
    seed_admin(&repo, &config).await;

    // 4. Storage
    let storage = storage::from_config(&config.storage, &config.media_service_url);
    storage.ensure_bucket_exists().await;
    tracing::info!("Storage provider: {:?}", config.storage.provider);

    // 5. Scheduled publishing
    let mut scheduler = None;
    if config.scheduler_enabled {
        match PublishScheduler::new(repo.clone(), &config.scheduler_cron).await {
            Ok(job) => match job.start().await {
                Ok(()) => scheduler = Some(job),
                Err(e) => tracing::error!("Failed to start scheduler: {}", e),
            },
            Err(e) => tracing::error!("Failed to create scheduler: {}", e),
        }
    }

    // 6. State, router and server
    let port = config.port;
    let app_state = AppState {
        repo,
        storage,
        config,
    };
    let app = create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui", port);

    // Connect info feeds the client IP used for anonymous comment likes.
    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;
    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
    }

    if let Some(mut job) = scheduler {
        if let Err(e) = job.shutdown().await {
            tracing::error!("Failed to stop scheduler: {}", e);
        }
    }
}
