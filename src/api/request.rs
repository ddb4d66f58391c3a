//! API request helpers

use axum::extract::FromRequest;
use axum::extract::Json;
use axum::extract::Request;
use axum::extract::rejection::JsonRejection;
use serde::de::DeserializeOwned;
use url::Url;

use super::Error;

/// Parse and validate a URL
///
/// Only absolute `http` and `https` URLs can be shortened, surrounding whitespace is ignored
pub fn parse_url<I>(url: I) -> Result<Url, Error>
where
    I: AsRef<str>,
{
    let url = Url::parse(url.as_ref().trim())
        .map_err(|err| Error::bad_request("Invalid URL").with_description(err))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::bad_request("Invalid URL")
            .with_description(format!(r#"Scheme "{scheme}" is not supported"#))),
    }
}

/// Parse and normalize tokens to delete
///
/// Leading and trailing slashes are removed, at least one token is needed
pub fn parse_tokens(tokens: Vec<String>) -> Result<Vec<String>, Error> {
    if tokens.is_empty() {
        return Err(Error::bad_request("No tokens to delete"));
    }

    tokens
        .into_iter()
        .map(|token| {
            let token = token.trim().trim_matches('/');

            if token.is_empty() {
                Err(Error::bad_request("Tokens can not be empty"))
            } else {
                Ok(token.to_string())
            }
        })
        .collect()
}

fn parse_json<J>(json: Result<Json<J>, JsonRejection>) -> Result<J, Error> {
    match json {
        Ok(Json(json)) => Ok(json),
        Err(err) => match err {
            JsonRejection::JsonDataError(err) => {
                Err(Error::bad_request("Data error").with_description(err))
            }
            JsonRejection::JsonSyntaxError(err) => {
                let description = std::error::Error::source(&err)
                    .map_or_else(|| err.to_string(), ToString::to_string);

                Err(Error::bad_request("JSON syntax error").with_description(description))
            }
            JsonRejection::MissingJsonContentType(_err) => Err(Error::bad_request(
                "Missing `application/json` content type",
            )),
            JsonRejection::BytesRejection(err) => {
                Err(Error::bad_request("Invalid characters in JSON").with_description(err))
            }
            err => Err(Error::bad_request("Unknown JSON error").with_description(err)),
        },
    }
}

/// Wrapper for the JSON extractor
///
/// Rejections become API errors
pub struct Form<F>(pub F);

impl<S, F> FromRequest<S> for Form<F>
where
    S: Send + Sync,
    F: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let json = Json::<F>::from_request(req, state).await;

        parse_json(json).map(Form)
    }
}
