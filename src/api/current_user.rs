//! Current user service
//!
//! Every visitor gets an identity, kept in a signed `user_id` cookie. Visitors without a
//! valid cookie get a fresh identity and the cookie to go with it.

use std::ops::Deref;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum_extra::headers::Cookie;
use axum_extra::headers::HeaderMapExt;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::api::Error;

/// Name of the identity cookie
pub const COOKIE_NAME: &str = "user_id";

/// How long an identity is valid, in seconds
const IDENTITY_TTL: i64 = 60 * 60 * 24 * 365;

/// The keys used for encoding/decoding identity tokens
#[derive(Clone)]
pub struct JwtKeys {
    /// The encoding key
    encoding: EncodingKey,

    /// The decoding key
    decoding: DecodingKey,
}

impl JwtKeys {
    /// Create new encoding/decoding keys, derived from a secret
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// The JWT claims to identify a user
#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    /// The user ID
    sub: String,

    /// When the identity expires
    exp: i64,
}

/// Current user service
///
/// Derefs to the user ID
#[derive(Clone, Debug)]
pub struct CurrentUser {
    /// The user ID
    id: Arc<str>,
}

impl CurrentUser {
    fn new(id: &str) -> Self {
        Self { id: Arc::from(id) }
    }
}

impl Deref for CurrentUser {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.id
    }
}

/// Generate a signed identity token for a user ID
fn generate_token(jwt_keys: &JwtKeys, user_id: &str) -> Result<String, Error> {
    use jsonwebtoken::Header;
    use jsonwebtoken::encode;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + IDENTITY_TTL,
    };

    encode(&Header::default(), &claims, &jwt_keys.encoding).map_err(Error::internal_server_error)
}

/// Get the user ID out of a signed identity token
///
/// `None` for tampered, expired or otherwise invalid tokens
fn decode_token(jwt_keys: &JwtKeys, token: &str) -> Option<String> {
    use jsonwebtoken::Validation;
    use jsonwebtoken::decode;

    match decode::<Claims>(token, &jwt_keys.decoding, &Validation::default()) {
        Ok(token_data) if !token_data.claims.sub.is_empty() => Some(token_data.claims.sub),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!("Ignoring invalid identity cookie: {err}");

            None
        }
    }
}

/// Middleware resolving the current user of every request
///
/// Adds the [`CurrentUser`] to the request and sets the cookie for new identities
pub async fn identify(
    State(jwt_keys): State<JwtKeys>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = request
        .headers()
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(COOKIE_NAME).map(ToString::to_string))
        .and_then(|token| decode_token(&jwt_keys, &token));

    let (current_user, new_token) = if let Some(user_id) = existing {
        (CurrentUser::new(&user_id), None)
    } else {
        let user_id = Uuid::new_v4().to_string();

        match generate_token(&jwt_keys, &user_id) {
            Ok(token) => {
                tracing::debug!("New identity: {user_id}");

                (CurrentUser::new(&user_id), Some(token))
            }
            Err(err) => return err.into_response(),
        }
    };

    request.extensions_mut().insert(current_user);

    let mut response = next.run(request).await;

    if let Some(token) = new_token {
        let cookie = format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax");

        match HeaderValue::from_str(&cookie) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(err) => tracing::error!("Could not set identity cookie: {err}"),
        }
    }

    response
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| Error::internal_server_error("Could not identify user"))
    }
}
