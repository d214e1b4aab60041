use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::serve;
use axum::{Json, Router};
use lost_capacity::analysis::compute_lost_capacity;
use lost_capacity::batch::lease::InMemoryLeaseStore;
use lost_capacity::batch::runner::recompute_all;
use lost_capacity::common::config::{EngineConfig, UserEngineConfig};
use lost_capacity::common::error::LostCapacityError;
use lost_capacity::common::network_data::SewerNetwork;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    config: Arc<EngineConfig>,
    leases: Arc<InMemoryLeaseStore>,
    holder: Arc<String>,
}

fn error_response(status: StatusCode, message: String) -> Response {
    let json_response = json!({
        "status": "error",
        "message": message
    });

    (status, Json(json_response)).into_response()
}

async fn get_lost_capacity(
    State(state): State<AppState>,
    Query(query): Query<UserEngineConfig>,
    Json(network): Json<SewerNetwork>,
) -> Response {
    let config = match state.config.as_ref().clone().with_overrides(query) {
        Ok(config) => config,
        Err(err) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                err.to_string(),
            );
        }
    };

    let outcome = tokio::task::spawn_blocking(move || {
        compute_lost_capacity(&network, &config)
    })
    .await;

    match outcome {
        Ok(Ok(results)) => (StatusCode::OK, Json(results)).into_response(),
        Ok(Err(err)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        Err(err) => {
            error!("Lost capacity computation panicked: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn get_recompute_all(
    State(state): State<AppState>,
    Json(networks): Json<Vec<SewerNetwork>>,
) -> Response {
    let config = Arc::clone(&state.config);
    let leases = Arc::clone(&state.leases);
    let holder = Arc::clone(&state.holder);

    let outcome = tokio::task::spawn_blocking(move || {
        recompute_all(&networks, &config, leases.as_ref(), &holder)
    })
    .await;

    match outcome {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(err @ LostCapacityError::LeaseHeld { .. })) => {
            error_response(StatusCode::CONFLICT, err.to_string())
        }
        Ok(Err(err)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(err) => {
            error!("Batch run panicked: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn health_check() -> impl IntoResponse {
    let msg = "Lost capacity service is running";

    let json_response = json!({
        "status": "success",
        "message": msg
    });

    Json(json_response)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env().expect("Invalid configuration!");
    let bind_addr = config.bind_addr.clone();

    let state = AppState {
        config: Arc::new(config),
        leases: Arc::new(InMemoryLeaseStore::new()),
        holder: Arc::new(format!("lost-capacity-{}", std::process::id())),
    };

    let router = Router::new()
        .route("/healthcheck", get(health_check))
        .route("/lost_capacity", post(get_lost_capacity))
        .route("/recompute_all", post(get_recompute_all))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|_| panic!("Error binding to {}!", bind_addr));

    info!("Serving lost capacity API on {}", bind_addr);
    serve(listener, router).await.expect("Error serving API!");
}
