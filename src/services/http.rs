use super::node::CacheService;
use crate::error::Error;

use axum::body::Bytes;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Header carrying the idle timeout (seconds) of a PUT.
pub const TTL_HEADER: &str = "Ttl";

pub fn router(service: Arc<CacheService>) -> Router {
    Router::new()
        .route(
            "/v1/cache/:key",
            get(handle_get).put(handle_put).delete(handle_delete),
        )
        .route("/v1/status", get(handle_status))
        .route("/v1/nodes", get(handle_nodes))
        .layer(Extension(service))
}

/// Serves the HTTP surface on an already bound listener.
pub async fn serve_http(listener: TcpListener, service: Arc<CacheService>) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn handle_get(
    Extension(service): Extension<Arc<CacheService>>,
    Path(key): Path<String>,
    uri: Uri,
) -> Response {
    match service.get(&key).await {
        Ok(Some(value)) => (StatusCode::OK, value).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(e, &uri),
    }
}

async fn handle_put(
    Extension(service): Extension<Arc<CacheService>>,
    Path(key): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = service.check_owner(key.as_bytes()) {
        return error_response(e, &uri);
    }

    let ttl = match ttl_of(&headers) {
        Ok(ttl) => ttl,
        Err(message) => {
            tracing::debug!("Rejected PUT {}: {}", key, message);
            return (StatusCode::BAD_REQUEST, message).into_response();
        }
    };

    match service.set(&key, &body, ttl).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => error_response(e, &uri),
    }
}

async fn handle_delete(
    Extension(service): Extension<Arc<CacheService>>,
    Path(key): Path<String>,
    uri: Uri,
) -> Response {
    match service.delete(&key).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e, &uri),
    }
}

async fn handle_status(Extension(service): Extension<Arc<CacheService>>) -> Response {
    Json(service.status().await).into_response()
}

async fn handle_nodes(Extension(service): Extension<Arc<CacheService>>) -> Response {
    Json(service.nodes()).into_response()
}

/// TTL from the `Ttl` header; absent means never expire.
fn ttl_of(headers: &HeaderMap) -> Result<i64, String> {
    let Some(value) = headers.get(TTL_HEADER) else {
        return Ok(crate::cache::NEVER_EXPIRE);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .ok_or_else(|| format!("invalid {} header", TTL_HEADER))
}

fn error_response(err: Error, uri: &Uri) -> Response {
    match err {
        Error::RedirectRequired { owner } => {
            let path = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or_else(|| uri.path());
            let location = format!("http://{}{}", owner, path);
            (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response()
        }
        Error::CapacityExceeded => {
            (StatusCode::PAYLOAD_TOO_LARGE, format!("Error:{}", err)).into_response()
        }
        Error::NoAvailableNode => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response(),
        Error::InvalidArgument(_) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        other => {
            tracing::error!("Request {} failed: {}", uri, other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
        }
    }
}
