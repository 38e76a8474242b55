use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRequest;
use axum::extract::Multipart;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Form;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::gate::GateError;
use crate::orchestrator::Orchestrator;
use crate::orchestrator::RunError;
use crate::orchestrator::StatusResponse;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    orchestrator: Arc<Orchestrator>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for the webhook endpoint
///
/// `?status`, `?enable` and `?disable` are answered directly; anything else
/// is treated as a Plex webhook carrying a `payload` form field.
#[tracing::instrument(skip_all)]
async fn webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let orchestrator = &state.orchestrator;

    if params.contains_key("status") {
        return status_response(orchestrator.status().await);
    }
    if params.contains_key("enable") {
        return status_response(orchestrator.set_enabled(true).await);
    }
    if params.contains_key("disable") {
        return status_response(orchestrator.set_enabled(false).await);
    }

    let payload = match read_payload(request).await {
        Ok(payload) => payload,
        Err(rejection) => return rejection,
    };

    match orchestrator.handle_webhook(payload.as_deref()).await {
        Ok(report) => (StatusCode::OK, report.to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

fn status_response(result: Result<StatusResponse, RunError>) -> Response {
    match result {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Extract the `payload` field from a urlencoded or multipart body.
///
/// Plex posts multipart bodies (the payload plus an optional thumbnail).
async fn read_payload(request: Request) -> Result<Option<String>, Response> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(IntoResponse::into_response)?
        {
            if field.name() == Some("payload") {
                let text = field.text().await.map_err(IntoResponse::into_response)?;
                return Ok(Some(text));
            }
        }
        Ok(None)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(mut fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        Ok(fields.remove("payload"))
    } else {
        Ok(None)
    }
}

impl IntoResponse for RunError {
    fn into_response(self) -> Response {
        let status = match &self {
            RunError::MissingPayload | RunError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            RunError::Gate(GateError::Busy | GateError::Locked { .. }) => StatusCode::CONFLICT,
            RunError::Gate(GateError::Io(..)) | RunError::State(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // Requests that are understood but deliberately ignored
            RunError::Disabled
            | RunError::UnknownEvent(_)
            | RunError::PlayerMismatch { .. }
            | RunError::ExcludedSection(_)
            | RunError::Transition(_) => StatusCode::OK,
        };

        (status, self.to_string()).into_response()
    }
}

/// Create the API router with all endpoints
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = Arc::new(AppState {
        version: env!("CARGO_PKG_VERSION"),
        orchestrator,
    });

    Router::new()
        .route("/", get(webhook).post(webhook))
        .route("/webhook", get(webhook).post(webhook))
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Start the HTTP server
///
/// This function will bind to the specified address and serve the webhook
/// and API endpoints. It will run until the provided shutdown signal is
/// triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "0.0.0.0")
/// * `port` - The port to listen on (e.g., 8565)
/// * `orchestrator` - Handles the webhooks
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
///
/// # Returns
/// Returns Ok(()) if the server shuts down gracefully, or an error if startup fails
pub async fn serve(
    listen: &str,
    port: u16,
    orchestrator: Arc<Orchestrator>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(orchestrator);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP server shutting down gracefully");
        })
        .await?;

    Ok(())
}
