#![allow(dead_code)]

use anyhow::anyhow;
use cinefave::auth::{IdentityApi, User};
use cinefave::favorites::FavoritesStore;
use cinefave::models::{CastMember, Genre, MediaBundle, MediaId, MediaItem, MediaType, Video};
use cinefave::tmdb::{Catalog, TmdbApi};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
pub struct MemoryStore {
    pub docs: Mutex<HashMap<String, Vec<MediaId>>>,
    pub saves: Mutex<Vec<(String, Vec<MediaId>)>>,
    pub fail_loads: AtomicBool,
    pub fail_saves: AtomicBool,
    pub loads: AtomicU64,
    pub load_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn with_user(uid: &str, favorites: Vec<MediaId>) -> Arc<Self> {
        let store = Self::default();
        store.docs.lock().unwrap().insert(uid.to_string(), favorites);
        Arc::new(store)
    }

    pub fn remote(&self, uid: &str) -> Option<Vec<MediaId>> {
        self.docs.lock().unwrap().get(uid).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    pub fn recover_loads(&self) {
        self.fail_loads.store(false, Ordering::SeqCst);
    }

    pub fn slow_loads(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FavoritesStore for MemoryStore {
    async fn load(&self, uid: &str) -> anyhow::Result<Vec<MediaId>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(anyhow!("document store unavailable"));
        }
        Ok(self.remote(uid).unwrap_or_default())
    }

    async fn save(&self, uid: &str, favorites: &[MediaId]) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied"));
        }
        self.saves
            .lock()
            .unwrap()
            .push((uid.to_string(), favorites.to_vec()));
        self.docs
            .lock()
            .unwrap()
            .insert(uid.to_string(), favorites.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTmdb {
    pub bundle: Option<MediaBundle>,
    pub error: Option<String>,
    pub catalog: Vec<MediaItem>,
    pub gate: Option<Arc<Notify>>,
    pub requested: Mutex<Vec<(MediaType, MediaId)>>,
}

impl FakeTmdb {
    pub fn last_request(&self) -> Option<(MediaType, MediaId)> {
        self.requested.lock().unwrap().last().copied()
    }
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn fetch_media(&self, media_type: MediaType, id: MediaId) -> anyhow::Result<MediaBundle> {
        self.requested.lock().unwrap().push((media_type, id));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = &self.error {
            return Err(anyhow!("{}", message));
        }
        let bundle = self
            .bundle
            .clone()
            .ok_or_else(|| anyhow!("missing media {}", id))?;
        assert_eq!(bundle.media.id, id);
        Ok(bundle)
    }

    async fn fetch_catalog(
        &self,
        _media_type: MediaType,
        _catalog: Catalog,
    ) -> anyhow::Result<Vec<MediaItem>> {
        if let Some(message) = &self.error {
            return Err(anyhow!("{}", message));
        }
        Ok(self.catalog.clone())
    }
}

pub struct FakeIdentity;

#[async_trait::async_trait]
impl IdentityApi for FakeIdentity {
    async fn lookup(&self, id_token: &str) -> anyhow::Result<User> {
        match id_token {
            "good-token" => Ok(User {
                uid: "u1".to_string(),
                email: Some("u1@example.com".to_string()),
            }),
            _ => Err(anyhow!("INVALID_ID_TOKEN")),
        }
    }
}

pub fn movie(id: MediaId, title: &str) -> MediaItem {
    MediaItem {
        id,
        title: Some(title.to_string()),
        poster_path: Some(format!("/{id}.jpg")),
        overview: format!("{title} overview"),
        vote_average: 7.4,
        ..MediaItem::default()
    }
}

pub fn show(id: MediaId, name: &str) -> MediaItem {
    MediaItem {
        id,
        name: Some(name.to_string()),
        poster_path: Some(format!("/{id}.jpg")),
        vote_average: 8.4,
        ..MediaItem::default()
    }
}

pub fn video(video_type: &str, site: &str, key: &str) -> Video {
    Video {
        video_type: video_type.to_string(),
        site: site.to_string(),
        key: key.to_string(),
    }
}

pub fn fight_club() -> MediaBundle {
    MediaBundle {
        media: MediaItem {
            id: 550,
            title: Some("Fight Club".to_string()),
            poster_path: Some("/fc.jpg".to_string()),
            overview: "An insomniac office worker...".to_string(),
            genres: vec![
                Genre {
                    id: 18,
                    name: "Drama".to_string(),
                },
                Genre {
                    id: 53,
                    name: "Thriller".to_string(),
                },
            ],
            release_date: Some("1999-10-15".to_string()),
            vote_average: 8.4,
            status: Some("Released".to_string()),
            popularity: 61.4,
            ..MediaItem::default()
        },
        cast: vec![
            CastMember {
                id: 819,
                cast_id: Some(4),
                name: "Edward Norton".to_string(),
                character_name: "The Narrator".to_string(),
                profile_path: Some("/norton.jpg".to_string()),
            },
            CastMember {
                id: 287,
                cast_id: None,
                name: "Brad Pitt".to_string(),
                character_name: "Tyler Durden".to_string(),
                profile_path: None,
            },
        ],
        videos: vec![
            video("Featurette", "YouTube", "feat-1"),
            video("Clip", "YouTube", "clip-1"),
            video("Trailer", "YouTube", "SUXWAEX2jlg"),
        ],
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
