//! Axum-based HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::rate_limit;
use crate::routes;
use crate::state::GatewayState;

/// Build the full router: `/health`, the public probe script, and `/api`.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let api = routes::api_router().layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::enforce,
    ));

    #[allow(unused_mut)]
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/preview/probe.js", get(routes::preview::probe_script))
        .merge(api);

    #[cfg(feature = "metrics")]
    {
        app = app
            .route("/metrics", get(crate::metrics::metrics_handler))
            .layer(middleware::from_fn(crate::metrics::track));
    }

    app.layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &GatewayState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .gateway
        .as_ref()
        .map(|g| g.cors_origins.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Start the gateway HTTP server and serve until Ctrl+C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.gateway_bind();

    #[cfg(feature = "metrics")]
    crate::metrics::install_prometheus_recorder();

    let app = build_router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "status": "ok",
        "version": version,
        "generation": state.generator.is_some(),
        "key_vault": state.vault.is_some(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use codegenesis_core::config::Config;
    use codegenesis_core::store::MemoryStore;
    use codegenesis_providers::StaticTokens;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = GatewayState::new(
            Arc::new(Config::default()),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticTokens::new([("tok", "alice")])),
        );
        build_router(Arc::new(state))
    }

    async fn call(req: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["generation"], false);
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let (status, body) =
            call(Request::get("/api/projects").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, body) = call(
            Request::get("/api/projects")
                .header("authorization", "Bearer tok")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_probe_script_is_public() {
        let response = app()
            .oneshot(Request::get("/preview/probe.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("TOGGLE_VISUAL_EDIT"));
    }
}
