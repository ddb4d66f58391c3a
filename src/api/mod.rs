//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;

pub use current_user::CurrentUser;
pub use current_user::JwtKeys;
pub use current_user::identify;
pub use ping::ping;
pub use request::Form;
pub use request::parse_tokens;
pub use request::parse_url;
pub use response::Error;
pub use response::Success;

use crate::storage::Storage;

mod current_user;
mod ping;
mod request;
mod response;
mod shorten;
mod user_urls;

/// Get the Axum router for all API routes
pub fn router<S: Storage>() -> Router {
    let user = Router::new().route(
        "/urls",
        get(user_urls::list::<S>).delete(user_urls::delete),
    );

    Router::new()
        .route("/shorten", post(shorten::create::<S>))
        .route("/shorten/batch", post(shorten::batch::<S>))
        .nest("/user", user)
}
