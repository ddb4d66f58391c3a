//! The root!
//!
//! Redirecting tokens to their URL, and shortening plain text URLs

use std::str::Utf8Error;

use axum::Extension;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::LOCATION;
use percent_encoding::percent_decode_str;

use crate::api::CurrentUser;
use crate::api::Error;
use crate::api::parse_url;
use crate::storage::Storage;
use crate::urls::Shortener;

/// The root!
///
/// All wildcard GET requests end up in this function.
///
/// A lookup in storage will be done looking for the right token, based on the path
pub async fn root<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    uri: Uri,
) -> Result<(StatusCode, HeaderMap), (StatusCode, String)> {
    let token = uri.path().trim_matches('/');
    let token = url_decode_token(token).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            "URL contains invalid UTF-8 characters".to_string(),
        )
    })?;

    tracing::debug!("Looking for token: /{token}");

    let mut headers = HeaderMap::new();

    if token.is_empty() {
        return Ok((StatusCode::NOT_FOUND, headers));
    }

    let short_url = shortener.expand(&token).await.map_err(internal_error)?;

    let status_code = if let Some(short_url) = short_url {
        if short_url.is_deleted() {
            tracing::debug!(r#"Token "{token}" no longer exists"#);

            StatusCode::GONE
        } else {
            tracing::debug!(r#"Token "{token}" redirecting to: {}"#, short_url.original_url);

            let location = HeaderValue::from_str(&short_url.original_url).map_err(internal_error)?;
            headers.insert(LOCATION, location);

            StatusCode::TEMPORARY_REDIRECT
        }
    } else {
        tracing::debug!(r#"Token "{token}" not found"#);

        StatusCode::NOT_FOUND
    };

    Ok((status_code, headers))
}

/// Shorten a URL given as plain text body
///
/// Request:
/// ```sh
/// curl -v -d 'https://www.example.com/' http://localhost:8080/
/// ```
///
/// Response, as plain text:
/// ```text
/// http://localhost:8080/<token>
/// ```
pub async fn shorten<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    current_user: CurrentUser,
    body: String,
) -> Result<(StatusCode, String), Error> {
    let url = parse_url(&body)?;

    let short_url = shortener
        .shorten(&current_user, &url)
        .await
        .map_err(Error::internal_server_error)?;

    Ok((StatusCode::CREATED, short_url))
}

/// Utility function for mapping any error into a `500 Internal Server Error`
/// response.
fn internal_error<E>(err: E) -> (StatusCode, String)
where
    E: std::error::Error,
{
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// URL decode token
///
/// Uses percentage encoding for the decoding, might error in case of invalid UTF-8
fn url_decode_token(token: &str) -> Result<String, Utf8Error> {
    let decoded = percent_decode_str(token);

    decoded.decode_utf8().map(|decoded| decoded.to_string())
}
