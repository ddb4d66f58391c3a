//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::urls::ShortUrl;

use super::CreateUrlValues;
use super::Error;
use super::Result;
use super::Storage;

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All short URLs in storage, by token
    urls: Arc<Mutex<HashMap<String, ShortUrl>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for Memory {
    async fn find_single_url_by_token(&self, token: &str) -> Result<Option<ShortUrl>> {
        Ok(self.urls.lock().await.get(token).cloned())
    }

    async fn find_all_urls_by_user(&self, user_id: &str) -> Result<Vec<ShortUrl>> {
        let mut urls = self
            .urls
            .lock()
            .await
            .values()
            .filter(|url| url.user_id == user_id && !url.is_deleted())
            .cloned()
            .collect::<Vec<ShortUrl>>();

        // keep the listing stable, the map has no order
        urls.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.token.cmp(&b.token)));

        Ok(urls)
    }

    async fn create_url(&self, values: &CreateUrlValues<'_>) -> Result<ShortUrl> {
        let mut urls = self.urls.lock().await;

        match urls.entry(values.token.to_string()) {
            Entry::Occupied(_) => Err(Error::Conflict(values.token.to_string())),
            Entry::Vacant(entry) => {
                let url = ShortUrl {
                    token: values.token.to_string(),
                    original_url: values.original_url.to_string(),
                    user_id: values.user_id.to_string(),
                    created_at: Utc::now().naive_utc(),
                    deleted_at: None,
                };

                Ok(entry.insert(url).clone())
            }
        }
    }

    async fn mark_deleted_batch(&self, tokens: &[String], user_id: &str) -> Result<()> {
        let now = Utc::now().naive_utc();
        let mut urls = self.urls.lock().await;

        for token in tokens {
            if let Some(url) = urls.get_mut(token) {
                if url.user_id == user_id && url.deleted_at.is_none() {
                    url.deleted_at = Some(now);
                }
            }
        }

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
