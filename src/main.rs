#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::sync::Arc;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::JwtKeys;
use crate::config::Config;
use crate::deletion::Dispatcher;
use crate::generator::Generator;
use crate::generator::RandomGenerator;
use crate::storage::Backend;
use crate::storage::Storage;
use crate::urls::Shortener;

mod api;
mod config;
mod deletion;
mod generator;
mod graceful_shutdown;
mod root;
mod storage;
mod urls;
mod utils;

const DEFAULT_RUST_LOG: &str = "shortener=debug,tower_http=debug";

/// The router with everything it depends on
pub struct App {
    /// Router serving all requests
    pub router: Router,

    /// Deletion pool, shut down after the router stops
    pub dispatcher: Dispatcher,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let config = Config::from_env()?;

    let App { router, dispatcher } = setup_app(&config).await?;

    let listener = TcpListener::bind(config.address).await?;
    tracing::info!("Listening on {}", config.address);

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown::handler())
        .await?;

    dispatcher.shutdown(config.shutdown_timeout).await;

    Ok(())
}

/// Create and setup the app with its dependencies
///
/// # Errors
///
/// Will return `Err` if any of its dependencies fail to load:
/// - Database connection
/// - Deletion pool setup
pub async fn setup_app(config: &Config) -> Result<App> {
    let generator = Arc::new(RandomGenerator);

    match storage::setup(config.database_url.as_deref()).await? {
        Backend::Memory(memory) => create_app(memory, generator, config),
        Backend::Postgres(postgres) => create_app(postgres, generator, config),
    }
}

/// Create the app on top of a storage
///
/// # Errors
///
/// Will return `Err` if the deletion pool can not be started
pub fn create_app<S: Storage>(
    storage: S,
    generator: Arc<dyn Generator>,
    config: &Config,
) -> Result<App> {
    let dispatcher = Dispatcher::start(storage.clone(), &config.deletion)?;
    let shortener = Shortener::new(storage, generator, &config.base_url);
    let jwt_keys = JwtKeys::new(config.secret_key.as_bytes());

    let router = create_router(shortener, dispatcher.clone(), jwt_keys);

    Ok(App { router, dispatcher })
}

/// Create the router for the shortener
fn create_router<S: Storage>(
    shortener: Shortener<S>,
    dispatcher: Dispatcher,
    jwt_keys: JwtKeys,
) -> Router {
    Router::new()
        .route("/", post(root::shorten::<S>).get(root::root::<S>))
        .route("/ping", get(api::ping::<S>))
        .nest("/api", api::router::<S>())
        .fallback(get(root::root::<S>))
        .layer(middleware::from_fn_with_state(jwt_keys, api::identify))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(shortener))
        .layer(Extension(dispatcher))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}
