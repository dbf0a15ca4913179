//! HTTP API for the coordinator
//!
//! - `GET /<key>`    302 to a volume holding the value (or the fallback)
//! - `PUT /<key>`    write the value to its target volumes, then the record
//! - `UNLINK /<key>` tombstone the record, keep the data
//! - `DELETE /<key>` tombstone, remove the data, then drop the record
//! - `GET /health`   coordinator and filter status
//!
//! Writes hold the key lock for the whole request, volume traffic included.

use crate::common::{blake3_hash, validate_key, Error};
use crate::coordinator::record::{Record, RecordStatus};
use crate::coordinator::volume_client::{volume_url, VolumeTransport};
use crate::coordinator::Coordinator;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Largest value accepted on PUT
const MAX_VALUE_BYTES: usize = 1 << 30;

/// Creates the HTTP router.
pub fn create_router<T: VolumeTransport + 'static>(coordinator: Arc<Coordinator<T>>) -> Router {
    Router::new()
        .route("/health", get(health::<T>))
        .route("/*key", any(handle_key::<T>))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_VALUE_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

fn error_response(e: Error) -> Response {
    (e.to_http_status(), e.to_string()).into_response()
}

fn redirect(url: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

async fn health<T: VolumeTransport + 'static>(
    State(coordinator): State<Arc<Coordinator<T>>>,
) -> Response {
    let config = coordinator.config();
    match coordinator.filter_stats() {
        Ok(filter) => Json(json!({
            "status": "ok",
            "volumes": config.volumes,
            "replicas": config.replicas,
            "subvolumes": config.subvolumes,
            "lock_kind": config.lock_kind.to_string(),
            "writes_in_flight": coordinator.locks().len(),
            "filter": filter,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_key<T: VolumeTransport + 'static>(
    State(coordinator): State<Arc<Coordinator<T>>>,
    Path(key): Path<String>,
    method: Method,
    body: Bytes,
) -> Response {
    let key = key.into_bytes();
    if let Err(e) = validate_key(&key) {
        return error_response(e);
    }

    match method.as_str() {
        "GET" | "HEAD" => get_key(&coordinator, &key).await,
        "PUT" => put_key(&coordinator, &key, body).await,
        "DELETE" => delete_key(&coordinator, &key, false).await,
        "UNLINK" => delete_key(&coordinator, &key, true).await,
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn get_key<T: VolumeTransport>(coordinator: &Coordinator<T>, key: &[u8]) -> Response {
    let record = match coordinator.get_record(key) {
        Ok(record) => record,
        Err(e) => return error_response(e),
    };
    let placement = coordinator.placement();

    if record.is_present() {
        for volume in &record.locations {
            let path = placement.path(key, volume);
            match coordinator.transport().exists(volume, &path).await {
                Ok(true) => return redirect(volume_url(volume, &path)),
                Ok(false) => tracing::warn!("{} is missing {:?}", volume, String::from_utf8_lossy(key)),
                Err(e) => tracing::warn!("GET skipping {}: {}", volume, e),
            }
        }
    }

    match (&coordinator.config().fallback, record.status) {
        (Some(fallback), RecordStatus::Present | RecordStatus::Hard) => {
            redirect(volume_url(fallback, &placement.fallback_path(key)))
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_key<T: VolumeTransport>(coordinator: &Coordinator<T>, key: &[u8], body: Bytes) -> Response {
    if body.is_empty() {
        return StatusCode::LENGTH_REQUIRED.into_response();
    }
    let Some(_guard) = coordinator.try_lock(key) else {
        return error_response(Error::KeyContention(String::from_utf8_lossy(key).into_owned()));
    };

    match coordinator.get_record(key) {
        Ok(existing) if existing.is_present() => {
            return (StatusCode::FORBIDDEN, "key exists, delete it first").into_response()
        }
        Ok(_) => {}
        Err(e) => return error_response(e),
    }

    let placement = coordinator.placement();
    let targets = match placement.select_volumes(key) {
        Ok(targets) => targets,
        Err(e) => return error_response(e),
    };
    let checksum = coordinator.config().checksum.then(|| blake3_hash(&body));

    let paths: Vec<(String, String)> = targets
        .iter()
        .map(|v| (v.clone(), placement.path(key, v)))
        .collect();
    let results = join_all(
        paths
            .iter()
            .map(|(volume, path)| coordinator.transport().store(volume, path, body.clone())),
    )
    .await;
    for ((volume, _), result) in paths.iter().zip(results) {
        if let Err(e) = result {
            tracing::warn!("PUT {:?} to {} failed: {}", String::from_utf8_lossy(key), volume, e);
            return error_response(e);
        }
    }

    match coordinator.put_record(key, &Record::new(targets, checksum)) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_key<T: VolumeTransport>(
    coordinator: &Coordinator<T>,
    key: &[u8],
    unlink_only: bool,
) -> Response {
    let Some(_guard) = coordinator.try_lock(key) else {
        return error_response(Error::KeyContention(String::from_utf8_lossy(key).into_owned()));
    };

    let record = match coordinator.get_record(key) {
        Ok(record) => record,
        Err(e) => return error_response(e),
    };
    if record.is_hard() || (unlink_only && record.status == RecordStatus::SoftDeleted) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if !unlink_only && coordinator.config().protect && record.is_present() {
        return (StatusCode::FORBIDDEN, "protected, unlink first").into_response();
    }

    let tomb = match coordinator.delete_record(key) {
        Ok(Some(tomb)) => tomb,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return error_response(e),
    };
    if unlink_only {
        return StatusCode::NO_CONTENT.into_response();
    }

    let placement = coordinator.placement();
    for volume in &tomb.locations {
        let path = placement.path(key, volume);
        if let Err(e) = coordinator.transport().remove(volume, &path).await {
            tracing::warn!("DELETE {:?} on {} failed: {}", String::from_utf8_lossy(key), volume, e);
            return error_response(e);
        }
    }

    match coordinator.purge_record(key) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
