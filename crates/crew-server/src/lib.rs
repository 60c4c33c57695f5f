//! HTTP control plane for agent instances running on remote targets.

pub mod auth;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod locks;
pub mod reconciler;
pub mod remote;
pub mod routes;
pub mod state;
pub mod store;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use crew_core::config::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::ApiToken;
use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let token = ApiToken::new(app_state.config.server.api_token.as_deref());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Instances
        .route(
            "/api/instances",
            get(routes::instances::list_instances).post(routes::instances::create_instance),
        )
        .route("/api/instances/{id}", get(routes::instances::get_instance))
        // Actions
        .route(
            "/api/instances/{id}/actions",
            post(routes::actions::run_action),
        )
        // Commands
        .route(
            "/api/instances/{id}/command",
            post(routes::commands::submit_command).get(routes::commands::get_command),
        )
        // Cron
        .route(
            "/api/instances/{id}/cron",
            get(routes::cron::list_cron)
                .post(routes::cron::add_cron)
                .delete(routes::cron::remove_cron),
        )
        // Files
        .route(
            "/api/instances/{id}/files",
            get(routes::files::read_file).put(routes::files::write_file),
        )
        // Heartbeat (authenticated by the instance secret)
        .route("/api/heartbeat", post(routes::heartbeat::heartbeat))
        .layer(middleware::from_fn_with_state(
            token,
            auth::api_token_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the control plane on `config.server.bind`.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    serve_on(config, listener).await
}

/// Start the control plane on a pre-bound listener.
///
/// Lets the caller read the actual port first (useful when binding port 0).
pub async fn serve_on(config: Config, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(AppState::from_config(config).await?);

    tracing::info!("crew control plane listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
