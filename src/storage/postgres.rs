//! Postgres storage

use std::time::Duration;

use chrono::NaiveDateTime;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use crate::urls::ShortUrl;

use super::CreateUrlValues;
use super::Error;
use super::Result;
use super::Storage;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// Postgres row of a short URL
#[derive(sqlx::FromRow)]
struct SqlxShortUrl {
    token: String,
    original_url: String,
    user_id: String,
    created_at: NaiveDateTime,
    deleted_at: Option<NaiveDateTime>,
}

impl SqlxShortUrl {
    fn into_short_url(self) -> ShortUrl {
        ShortUrl {
            token: self.token,
            original_url: self.original_url,
            user_id: self.user_id,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        }
    }
}

/// Postgres storage
#[derive(Clone)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,
}

impl Postgres {
    /// Connect to Postgres
    ///
    /// Migrations will be run
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    pub async fn new_with_pool(connection_pool: PgPool) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(|err| Error::Connection(format!("Migrations could not run: {err}")))?;

        Ok(Self { connection_pool })
    }
}

impl Storage for Postgres {
    async fn find_single_url_by_token(&self, token: &str) -> Result<Option<ShortUrl>> {
        let url = sqlx::query_as::<_, SqlxShortUrl>(
            r"
            SELECT
                token,
                original_url,
                user_id,
                created_at,
                deleted_at
            FROM urls
            WHERE token = $1
            LIMIT 1
            ",
        )
        .bind(token)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(url.map(SqlxShortUrl::into_short_url))
    }

    async fn find_all_urls_by_user(&self, user_id: &str) -> Result<Vec<ShortUrl>> {
        let urls = sqlx::query_as::<_, SqlxShortUrl>(
            r"
            SELECT
                token,
                original_url,
                user_id,
                created_at,
                deleted_at
            FROM urls
            WHERE deleted_at IS NULL
                AND user_id = $1
            ORDER BY created_at, token
            ",
        )
        .bind(user_id)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(urls.into_iter().map(SqlxShortUrl::into_short_url).collect())
    }

    async fn create_url(&self, values: &CreateUrlValues<'_>) -> Result<ShortUrl> {
        let url = sqlx::query_as::<_, SqlxShortUrl>(
            r"
            INSERT INTO urls (
                token,
                original_url,
                user_id
            )
            VALUES ($1, $2, $3)
            RETURNING
                token,
                original_url,
                user_id,
                created_at,
                deleted_at
            ",
        )
        .bind(values.token)
        .bind(values.original_url)
        .bind(values.user_id)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(|err| {
            let is_conflict = err
                .as_database_error()
                .is_some_and(|err| err.is_unique_violation());

            if is_conflict {
                Error::Conflict(values.token.to_string())
            } else {
                connection_error(err)
            }
        })?;

        Ok(url.into_short_url())
    }

    async fn mark_deleted_batch(&self, tokens: &[String], user_id: &str) -> Result<()> {
        // a single statement, concurrent batches on the same rows are serialized by Postgres
        sqlx::query(
            r"
            UPDATE urls
            SET deleted_at = NOW()
            WHERE token = ANY($1)
                AND user_id = $2
                AND deleted_at IS NULL
            ",
        )
        .bind(tokens.to_vec())
        .bind(user_id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.connection_pool)
            .await
            .map_err(connection_error)?;

        Ok(())
    }
}

/// Utility function for mapping any error into a storage error
fn connection_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Connection(err.to_string())
}
