//! Shorten API endpoints

use axum::Extension;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::storage::Storage;
use crate::urls::Shortener;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::Success;
use super::parse_url;

/// Shorten form
#[derive(Debug, Deserialize)]
pub struct ShortenForm {
    /// URL to shorten
    url: String,
}

/// Shorten response
#[derive(Debug, Serialize)]
pub struct ShortenResponse {
    /// The full short URL
    result: String,
}

/// Shorten a single URL
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "url": "https://www.example.com/" }' \
///     http://localhost:8080/api/shorten
/// ```
///
/// Response:
/// ```json
/// { "result": "http://localhost:8080/<token>" }
/// ```
pub async fn create<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    current_user: CurrentUser,
    Form(form): Form<ShortenForm>,
) -> Result<Success<ShortenResponse>, Error> {
    let url = parse_url(&form.url)?;

    let result = shortener
        .shorten(&current_user, &url)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::created(ShortenResponse { result }))
}

/// Batch shorten item
#[derive(Debug, Deserialize)]
pub struct BatchShortenItem {
    /// Chosen by the client, returned as is
    correlation_id: String,

    /// URL to shorten
    original_url: String,
}

/// Batch shorten response item
#[derive(Debug, Serialize)]
pub struct BatchShortenResponse {
    /// Correlation ID of the request item
    correlation_id: String,

    /// The full short URL
    short_url: String,
}

/// Shorten multiple URLs at once
///
/// Nothing is stored when any of the URLs is invalid
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '[{ "correlation_id": "1", "original_url": "https://www.example.com/" }]' \
///     http://localhost:8080/api/shorten/batch
/// ```
///
/// Response:
/// ```json
/// [{ "correlation_id": "1", "short_url": "http://localhost:8080/<token>" }]
/// ```
pub async fn batch<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    current_user: CurrentUser,
    Form(form): Form<Vec<BatchShortenItem>>,
) -> Result<Success<Vec<BatchShortenResponse>>, Error> {
    if form.is_empty() {
        return Err(Error::bad_request("No URLs to shorten"));
    }

    let urls = form
        .into_iter()
        .map(|item| match parse_url(&item.original_url) {
            Ok(url) => Ok((item.correlation_id, url)),
            Err(err) => Err(err.with_description(format!(
                r#"Invalid URL for correlation ID "{}""#,
                item.correlation_id
            ))),
        })
        .collect::<Result<Vec<(String, Url)>, Error>>()?;

    let short_urls = shortener
        .shorten_batch(&current_user, &urls)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::created(
        short_urls
            .into_iter()
            .map(|(correlation_id, short_url)| BatchShortenResponse {
                correlation_id,
                short_url,
            })
            .collect(),
    ))
}
