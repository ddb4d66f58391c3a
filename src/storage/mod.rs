//! All things related to the storage of short URLs

use core::fmt;
use std::future::Future;

use crate::urls::ShortUrl;

pub use memory::Memory;
pub use postgres::Postgres;

mod memory;
mod postgres;

/// Storage errors
#[derive(Debug)]
pub enum Error {
    /// A connection error with the storage
    Connection(String),

    /// The token is already taken by another short URL
    Conflict(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Connection(error) => write!(f, "Connection error: {error}"),
            Error::Conflict(token) => write!(f, "Token already exists: {token}"),
        }
    }
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Values to create a short URL
pub struct CreateUrlValues<'a> {
    /// The token identifying the short URL
    pub token: &'a str,

    /// The URL the token redirects to
    pub original_url: &'a str,

    /// The user owning the short URL
    pub user_id: &'a str,
}

/// Storage with all supported operations
///
/// Implementations synchronize internally, every operation can be called concurrently
pub trait Storage: Clone + Send + Sync + 'static {
    /// Find a single short URL by its token
    ///
    /// DOES NOT respect the soft-delete, handle with care
    fn find_single_url_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<ShortUrl>>> + Send;

    /// Find all short URLs of a user
    ///
    /// Respects the soft-delete
    fn find_all_urls_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<ShortUrl>>> + Send;

    /// Create a short URL
    ///
    /// Fails with [`Error::Conflict`] when the token is taken
    fn create_url(
        &self,
        values: &CreateUrlValues<'_>,
    ) -> impl Future<Output = Result<ShortUrl>> + Send;

    /// Soft-delete the short URLs of a user
    ///
    /// Tokens that are unknown or owned by another user are skipped, marking an already
    /// deleted short URL again leaves it untouched
    fn mark_deleted_batch(
        &self,
        tokens: &[String],
        user_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Check if the storage is reachable
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}

/// The storage picked at startup
pub enum Backend {
    /// Everything in memory, gone on shutdown
    Memory(Memory),

    /// Postgres, used when `DATABASE_URL` is set
    Postgres(Postgres),
}

/// Setup the storage
///
/// Postgres when a database URL is configured, in-memory otherwise
pub async fn setup(database_url: Option<&str>) -> Result<Backend> {
    if let Some(database_url) = database_url {
        tracing::info!("Using Postgres storage");

        Postgres::connect(database_url).await.map(Backend::Postgres)
    } else {
        tracing::info!("`DATABASE_URL` is not set, using in-memory storage");

        Ok(Backend::Memory(Memory::new()))
    }
}
