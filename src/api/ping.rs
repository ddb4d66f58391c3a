//! Storage health check

use axum::Extension;
use axum::http::StatusCode;

use crate::storage::Storage;
use crate::urls::Shortener;

/// Check if storage is reachable
///
/// `200 OK` when it is, `500 Internal Server Error` otherwise
pub async fn ping<S: Storage>(Extension(shortener): Extension<Shortener<S>>) -> StatusCode {
    match shortener.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::error!("Storage is not reachable: {err}");

            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
