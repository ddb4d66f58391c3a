//! User URL API endpoints
//!
//! Listing and deleting the short URLs of the current user

use axum::Extension;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use serde::Serialize;

use crate::deletion;
use crate::deletion::Dispatcher;
use crate::storage::Storage;
use crate::urls::Shortener;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::Success;
use super::parse_tokens;

/// Seconds a client should wait before resubmitting when the deletion queue is full
const RETRY_AFTER_SECONDS: &str = "1";

/// User URL response going to the user
#[derive(Debug, Serialize)]
pub struct UserUrlResponse {
    /// The full short URL
    short_url: String,

    /// Where the short URL redirects to
    original_url: String,
}

/// List all short URLs of the current user
///
/// Deleted short URLs are left out
///
/// Request:
/// ```sh
/// curl -v --cookie 'user_id=<token>' http://localhost:8080/api/user/urls
/// ```
///
/// Response:
/// ```json
/// [{ "short_url": "http://localhost:8080/<token>", "original_url": "https://www.example.com/" }]
/// ```
pub async fn list<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    current_user: CurrentUser,
) -> Result<Success<Vec<UserUrlResponse>>, Error> {
    let urls = shortener
        .user_urls(&current_user)
        .await
        .map_err(Error::internal_server_error)?;

    if urls.is_empty() {
        return Ok(Success::no_content());
    }

    Ok(Success::ok(
        urls.into_iter()
            .map(|url| UserUrlResponse {
                short_url: shortener.short_url(&url.token),
                original_url: url.original_url,
            })
            .collect(),
    ))
}

/// Delete short URLs of the current user
///
/// The deletion happens in the background, the response does not wait for it. Tokens of
/// other users are ignored. When the deletion queue is full the request is still accepted,
/// a `Retry-After` header tells the client the tokens were dropped.
///
/// Request:
/// ```sh
/// curl -v -XDELETE -H 'Content-Type: application/json' \
///     --cookie 'user_id=<token>' \
///     -d '["<token>", "<token>"]' \
///     http://localhost:8080/api/user/urls
/// ```
pub async fn delete(
    Extension(dispatcher): Extension<Dispatcher>,
    current_user: CurrentUser,
    Form(tokens): Form<Vec<String>>,
) -> Result<(StatusCode, HeaderMap), Error> {
    let tokens = parse_tokens(tokens)?;
    let count = tokens.len();

    let mut headers = HeaderMap::new();

    match dispatcher.submit(&current_user, tokens) {
        Ok(()) => {
            tracing::debug!(user_id = &*current_user, tokens = count, "Deletion queued");
        }
        Err(deletion::Error::QueueFull) => {
            tracing::warn!(
                user_id = &*current_user,
                tokens = count,
                "Deletion queue is full, dropping request"
            );

            headers.insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECONDS));
        }
        Err(deletion::Error::ShuttingDown) => {
            return Err(Error::service_unavailable("Shutting down"));
        }
        Err(err) => return Err(Error::bad_request(err)),
    }

    Ok((StatusCode::ACCEPTED, headers))
}
