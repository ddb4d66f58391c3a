//! Short URLs and the shortening service

use core::fmt;
use std::sync::Arc;

use chrono::naive::NaiveDateTime;
use url::Url;

use crate::generator::Generator;
use crate::storage;
use crate::storage::CreateUrlValues;
use crate::storage::Storage;

/// How many fresh tokens are tried when a generated token is taken
const MAX_TOKEN_ATTEMPTS: usize = 5;

#[derive(Clone, Debug)]
pub struct ShortUrl {
    pub token: String,
    pub original_url: String,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl ShortUrl {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Shortening errors
#[derive(Debug)]
pub enum Error {
    /// Storage failed
    Storage(storage::Error),

    /// Every generated token was already taken
    TokensExhausted,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Storage(error) => write!(f, "{error}"),
            Error::TokensExhausted => write!(f, "Could not generate a unique token"),
        }
    }
}

impl From<storage::Error> for Error {
    fn from(error: storage::Error) -> Self {
        Error::Storage(error)
    }
}

/// Shortening service
///
/// Creates short URLs for users and resolves them again
#[derive(Clone)]
pub struct Shortener<S: Storage> {
    /// Storage of the short URLs
    storage: S,

    /// Source of new tokens
    generator: Arc<dyn Generator>,

    /// Base of every short URL, without trailing slash
    base_url: Arc<str>,
}

impl<S: Storage> Shortener<S> {
    /// Create a new shortening service
    pub fn new(storage: S, generator: Arc<dyn Generator>, base_url: &str) -> Self {
        Self {
            storage,
            generator,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    /// The full short URL of a token
    pub fn short_url(&self, token: &str) -> String {
        format!("{}/{token}", self.base_url)
    }

    /// Shorten a URL for a user, returns the full short URL
    pub async fn shorten(&self, user_id: &str, url: &Url) -> Result<String, Error> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = self.generator.generate_id();

            let values = CreateUrlValues {
                token: &token,
                original_url: url.as_str(),
                user_id,
            };

            match self.storage.create_url(&values).await {
                Ok(short_url) => {
                    tracing::debug!(r#"Token "{token}" created for: {url}"#);

                    return Ok(self.short_url(&short_url.token));
                }
                Err(storage::Error::Conflict(token)) => {
                    tracing::debug!(r#"Token "{token}" already taken, trying another one"#);
                }
                Err(err) => {
                    tracing::error!(token = %token, url = %url, "Could not add short URL: {err}");

                    return Err(err.into());
                }
            }
        }

        Err(Error::TokensExhausted)
    }

    /// Shorten multiple URLs for a user
    ///
    /// Correlation IDs are kept, in the same order
    pub async fn shorten_batch(
        &self,
        user_id: &str,
        urls: &[(String, Url)],
    ) -> Result<Vec<(String, String)>, Error> {
        let mut short_urls = Vec::with_capacity(urls.len());

        for (correlation_id, url) in urls {
            let short_url = self.shorten(user_id, url).await?;

            short_urls.push((correlation_id.clone(), short_url));
        }

        Ok(short_urls)
    }

    /// Find a short URL by token
    ///
    /// Deleted short URLs are returned as well, the caller decides what gone means
    pub async fn expand(&self, token: &str) -> Result<Option<ShortUrl>, Error> {
        self.storage
            .find_single_url_by_token(token)
            .await
            .map_err(|err| {
                tracing::error!(token, "Could not get short URL: {err}");

                err.into()
            })
    }

    /// All short URLs of a user that are not deleted
    pub async fn user_urls(&self, user_id: &str) -> Result<Vec<ShortUrl>, Error> {
        Ok(self.storage.find_all_urls_by_user(user_id).await?)
    }

    /// Check if storage is reachable
    pub async fn ping(&self) -> Result<(), Error> {
        Ok(self.storage.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::storage::Memory;

    use super::*;

    /// Hands out a fixed list of tokens
    struct FixedGenerator(Mutex<VecDeque<&'static str>>);

    impl FixedGenerator {
        fn new(tokens: &[&'static str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(tokens.iter().copied().collect())))
        }
    }

    impl Generator for FixedGenerator {
        fn generate_id(&self) -> String {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or("fallback")
                .to_string()
        }
    }

    fn url(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[tokio::test]
    async fn test_shorten_and_expand() {
        let shortener = Shortener::new(
            Memory::new(),
            FixedGenerator::new(&["abcde"]),
            "http://localhost:8080/",
        );

        let short_url = shortener
            .shorten("u1", &url("https://www.example.com/"))
            .await
            .unwrap();
        assert_eq!("http://localhost:8080/abcde", short_url);

        let expanded = shortener.expand("abcde").await.unwrap().unwrap();
        assert_eq!("https://www.example.com/", expanded.original_url);
        assert_eq!("u1", expanded.user_id);
        assert!(!expanded.is_deleted());

        assert!(shortener.expand("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shorten_retries_taken_token() {
        let shortener = Shortener::new(
            Memory::new(),
            FixedGenerator::new(&["taken", "taken", "fresh"]),
            "http://localhost:8080",
        );

        shortener
            .shorten("u1", &url("https://www.example.com/"))
            .await
            .unwrap();

        let short_url = shortener
            .shorten("u2", &url("https://www.example.org/"))
            .await
            .unwrap();
        assert_eq!("http://localhost:8080/fresh", short_url);
    }

    #[tokio::test]
    async fn test_shorten_gives_up_on_taken_tokens() {
        let shortener = Shortener::new(
            Memory::new(),
            FixedGenerator::new(&["taken"]),
            "http://localhost:8080",
        );

        shortener
            .shorten("u1", &url("https://www.example.com/"))
            .await
            .unwrap();

        // every following attempt gets the fallback token, taken after the first time
        shortener
            .shorten("u1", &url("https://www.example.com/"))
            .await
            .unwrap();

        let result = shortener
            .shorten("u1", &url("https://www.example.com/"))
            .await;
        assert!(matches!(result, Err(Error::TokensExhausted)));
    }

    #[tokio::test]
    async fn test_shorten_batch_keeps_correlation_ids() {
        let shortener = Shortener::new(
            Memory::new(),
            FixedGenerator::new(&["one", "two"]),
            "http://localhost:8080",
        );

        let short_urls = shortener
            .shorten_batch(
                "u1",
                &[
                    ("a".to_string(), url("https://www.example.com/")),
                    ("b".to_string(), url("https://www.example.org/")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            vec![
                ("a".to_string(), "http://localhost:8080/one".to_string()),
                ("b".to_string(), "http://localhost:8080/two".to_string()),
            ],
            short_urls
        );

        let urls = shortener.user_urls("u1").await.unwrap();
        assert_eq!(2, urls.len());
    }
}
