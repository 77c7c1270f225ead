//! Forum Backend
//!
//! REST backend for threaded discussions and project/idea sharing, persisted in SQLite.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::{ProjectStore, Repository, ThreadStore, UserStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub threads: Arc<dyn ThreadStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub users: Arc<dyn UserStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// State with every store backed by the same SQLite repository.
    pub fn with_repository(repo: Repository, config: Config) -> Self {
        let repo = Arc::new(repo);
        Self {
            threads: repo.clone(),
            projects: repo.clone(),
            users: repo,
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting forum backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (FORUM_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let bind_addr = config.bind_addr;
    let state = AppState::with_repository(Repository::new(pool), config);

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Threads
        .route("/threads", get(api::list_threads))
        .route("/threads/recent", get(api::recent_posts))
        .route("/threads/{id}", get(api::get_thread).delete(api::delete_thread))
        .route(
            "/threads/{id}/replies",
            get(api::list_replies).post(api::create_reply),
        )
        .route(
            "/threads/{id}/like",
            post(api::like_thread).delete(api::unlike_thread),
        )
        .route("/replies/{id}", delete(api::delete_reply))
        .route("/posts", get(api::list_posts).post(api::create_post))
        // Projects and ideas
        .route(
            "/projects",
            get(api::list_projects).post(api::create_project),
        )
        .route(
            "/projects/{id}",
            get(api::get_project).delete(api::delete_project),
        )
        .route("/projects/{id}/collaborators", post(api::add_collaborator))
        .route("/projects/{id}/ideas", post(api::create_idea))
        .route(
            "/projects/{id}/ideas/{idea_id}",
            get(api::get_idea)
                .put(api::update_idea)
                .delete(api::delete_idea),
        )
        .route(
            "/projects/{id}/ideas/{idea_id}/bookmark",
            post(api::bookmark_idea).delete(api::unbookmark_idea),
        )
        .route("/ideas/bookmarked", get(api::bookmarked_ideas))
        // Users
        .route("/users", post(api::create_user))
        .route("/users/{id}", get(api::get_user))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
