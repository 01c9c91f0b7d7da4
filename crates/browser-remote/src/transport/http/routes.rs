//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Extension, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::Json,
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::service::{RelayOutcome, RelayQuery, RelayService};
use crate::timer::RequestTimer;

/// Body of `POST /`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayRequest {
    pub query: String,
    #[serde(default)]
    pub tabs: Option<String>,
}

/// Every response body has this shape, errors included.
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub status: String,
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
}

impl RelayResponse {
    fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            result: None,
            results: None,
        }
    }
}

type Reply = (StatusCode, Json<RelayResponse>);

pub fn routes(service: Arc<RelayService>) -> Router {
    Router::new()
        .route("/", post(relay_query).fallback(invalid_method))
        .fallback(not_found)
        .with_state(service)
}

async fn relay_query(
    State(service): State<Arc<RelayService>>,
    timer: Option<Extension<RequestTimer>>,
    body: Bytes,
) -> Reply {
    tracing::trace!("Got POST request");

    let request: RelayRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Error parsing POST request");
            return (
                StatusCode::BAD_REQUEST,
                Json(RelayResponse::status("invalid JSON")),
            );
        }
    };

    let query = RelayQuery {
        query: request.query,
        tabs: request.tabs,
    };
    let timer = timer.map(|Extension(RequestTimer(timer))| timer);

    match service.relay(query, timer).await {
        Ok(RelayOutcome::Responded(message)) => (
            StatusCode::OK,
            Json(RelayResponse {
                status: message.status,
                result: message.result,
                results: message.results,
            }),
        ),
        Ok(RelayOutcome::TimedOut) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RelayResponse::status("timeout")),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Unable to relay query");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RelayResponse::status("bridge closed")),
            )
        }
    }
}

async fn invalid_method(method: Method) -> Reply {
    tracing::error!(%method, "Invalid method");
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(RelayResponse::status("invalid method")),
    )
}

async fn not_found(uri: Uri) -> Reply {
    tracing::error!(path = %uri.path(), "Invalid path");
    (
        StatusCode::NOT_FOUND,
        Json(RelayResponse::status("not found")),
    )
}
