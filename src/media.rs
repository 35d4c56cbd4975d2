//! Media data loading for overview pages.
//!
//! A [`MediaResource`] starts fetching as soon as it is created and publishes
//! its progress through a watch channel. The fetch is never cancelled: dropping
//! the resource only means nobody observes the result.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::models::{MediaBundle, MediaId, MediaType};
use crate::tmdb::TmdbApi;

#[derive(Debug, Clone, PartialEq)]
pub enum MediaStatus {
    Loading,
    Error(String),
    Ready(Arc<MediaBundle>),
}

impl MediaStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, MediaStatus::Loading)
    }
}

#[derive(Debug, Clone)]
pub struct MediaResource {
    media_type: MediaType,
    id: MediaId,
    status: watch::Receiver<MediaStatus>,
}

impl MediaResource {
    pub fn load(tmdb: Arc<dyn TmdbApi>, media_type: MediaType, id: MediaId) -> Self {
        let (tx, rx) = watch::channel(MediaStatus::Loading);
        tokio::spawn(async move {
            let next = match tmdb.fetch_media(media_type, id).await {
                Ok(bundle) => MediaStatus::Ready(Arc::new(bundle)),
                Err(e) => {
                    warn!("Failed to load {} {}: {:#}", media_type, id, e);
                    MediaStatus::Error(e.to_string())
                }
            };
            // No receivers left means the page went away; the result is dropped.
            let _ = tx.send(next);
        });
        Self {
            media_type,
            id,
            status: rx,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn id(&self) -> MediaId {
        self.id
    }

    pub fn status(&self) -> MediaStatus {
        self.status.borrow().clone()
    }

    /// Waits until the fetch has either failed or produced data.
    pub async fn settled(&self) -> MediaStatus {
        let mut rx = self.status.clone();
        let status = match rx.wait_for(|s| !s.is_loading()).await {
            Ok(status) => status.clone(),
            Err(_) => MediaStatus::Error("media loader stopped".to_string()),
        };
        status
    }
}
