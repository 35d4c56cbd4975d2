//! Per-user favorites: local membership state mirrored into a remote store.
//!
//! Local state changes synchronously on toggle. Remote writes go through a
//! single writer task per [`FavoritesSync`], so they reach the store in the
//! same order the toggles happened. A failed write is logged and reported to
//! whoever awaits the [`PendingWrite`]; local state is left as it is.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::{debug, error, info, warn};

use crate::auth::{SessionState, User};
use crate::models::MediaId;

#[derive(Debug, thiserror::Error)]
pub enum FavoritesError {
    #[error("failed to load favorites for {uid}: {reason:#}")]
    Load { uid: String, reason: anyhow::Error },
    #[error("failed to save favorites for {uid}: {reason:#}")]
    Save { uid: String, reason: anyhow::Error },
    #[error("favorites writer is no longer running")]
    WriterGone,
}

/// Remote per-user favorites document.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    /// A user without a document, or without the field, has no favorites.
    async fn load(&self, uid: &str) -> anyhow::Result<Vec<MediaId>>;
    /// Merge-writes the `favorites` field, leaving other fields untouched.
    async fn save(&self, uid: &str, favorites: &[MediaId]) -> anyhow::Result<()>;
}

/// Favorite ids in insertion order. Only membership is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteList {
    ids: Vec<MediaId>,
}

impl FavoriteList {
    pub fn new(ids: Vec<MediaId>) -> Self {
        Self { ids }
    }

    pub fn contains(&self, id: MediaId) -> bool {
        self.ids.contains(&id)
    }

    /// Removes `id` if present, appends it otherwise. Returns the new membership.
    pub fn toggle(&mut self, id: MediaId) -> bool {
        if self.contains(id) {
            self.ids.retain(|x| *x != id);
            false
        } else {
            self.ids.push(id);
            true
        }
    }

    pub fn ids(&self) -> &[MediaId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[derive(Debug)]
pub enum Toggle {
    /// No session: nothing changed, the caller should send the user to login.
    LoginRequired,
    Applied {
        media_id: MediaId,
        favorite: bool,
        write: PendingWrite,
    },
}

/// Outcome of a queued remote write. May be awaited or dropped.
#[derive(Debug)]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<(), FavoritesError>>,
}

impl PendingWrite {
    pub async fn outcome(self) -> Result<(), FavoritesError> {
        self.rx.await.unwrap_or(Err(FavoritesError::WriterGone))
    }
}

struct WriteJob {
    uid: String,
    favorites: Vec<MediaId>,
    done: oneshot::Sender<Result<(), FavoritesError>>,
}

#[derive(Debug, Default)]
struct Local {
    user: Option<User>,
    list: FavoriteList,
    // Bumped on every session change so a slow load for an old session
    // cannot overwrite state that belongs to a newer one.
    generation: u64,
}

/// Local favorites state for one mounted component, plus its remote writer.
#[derive(Clone)]
pub struct FavoritesSync {
    store: Arc<dyn FavoritesStore>,
    local: Arc<Mutex<Local>>,
    writes: mpsc::UnboundedSender<WriteJob>,
}

impl std::fmt::Debug for FavoritesSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = self.lock();
        f.debug_struct("FavoritesSync")
            .field("user", &local.user)
            .field("favorites", &local.list)
            .finish()
    }
}

impl FavoritesSync {
    pub fn new(store: Arc<dyn FavoritesStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        // Runs until every clone of the sender is gone, then drains what is queued.
        tokio::spawn(run_writer(store.clone(), rx));
        Self {
            store,
            local: Arc::new(Mutex::new(Local::default())),
            writes: tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Local> {
        self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn contains(&self, id: MediaId) -> bool {
        self.lock().list.contains(id)
    }

    pub fn snapshot(&self) -> FavoriteList {
        self.lock().list.clone()
    }

    /// Reacts to a session change: loads the list on sign-in, clears it on sign-out.
    ///
    /// A repeated notification for the already signed-in user does not reload.
    /// A failed load is logged and returned; the list stays empty.
    pub async fn apply_session(&self, state: SessionState) -> Result<(), FavoritesError> {
        let (uid, generation) = {
            let mut local = self.lock();
            match state {
                SessionState::Unauthenticated => {
                    if local.user.take().is_some() {
                        debug!("Session ended, clearing local favorites");
                    }
                    local.list.clear();
                    local.generation += 1;
                    return Ok(());
                }
                SessionState::Authenticated(user) => {
                    if local.user.as_ref().map(|u| &u.uid) == Some(&user.uid) {
                        return Ok(());
                    }
                    let uid = user.uid.clone();
                    local.user = Some(user);
                    local.list.clear();
                    local.generation += 1;
                    (uid, local.generation)
                }
            }
        };

        let list = self.load(&uid).await.inspect_err(|e| warn!("{}", e))?;
        let mut local = self.lock();
        if local.generation == generation {
            info!("Loaded {} favorites for {}", list.len(), uid);
            local.list = list;
        } else {
            debug!("Discarding favorites load for stale session {}", uid);
        }
        Ok(())
    }

    async fn load(&self, uid: &str) -> Result<FavoriteList, FavoritesError> {
        self.store
            .load(uid)
            .await
            .map(FavoriteList::new)
            .map_err(|reason| FavoritesError::Load {
                uid: uid.to_string(),
                reason,
            })
    }

    /// Flips membership of `media_id` and queues the full list for persistence.
    pub fn toggle(&self, media_id: MediaId) -> Toggle {
        let (done, rx) = oneshot::channel();
        // Enqueued under the lock so queue order always matches toggle order.
        let mut local = self.lock();
        let Some(uid) = local.user.as_ref().map(|u| u.uid.clone()) else {
            return Toggle::LoginRequired;
        };
        let favorite = local.list.toggle(media_id);
        let job = WriteJob {
            uid,
            favorites: local.list.ids().to_vec(),
            done,
        };
        if let Err(mpsc::error::SendError(job)) = self.writes.send(job) {
            error!("Favorites writer stopped; change for {} not persisted", job.uid);
            let _ = job.done.send(Err(FavoritesError::WriterGone));
        }
        drop(local);

        Toggle::Applied {
            media_id,
            favorite,
            write: PendingWrite { rx },
        }
    }
}

/// One [`FavoritesSync`] per signed-in user, shared by every request for them.
///
/// The first caller for a user loads the remote list; concurrent callers for
/// the same user wait for that load and then share its state and writer.
/// A failed load is not cached, so the next caller tries again.
#[derive(Clone)]
pub struct FavoritesRegistry {
    store: Arc<dyn FavoritesStore>,
    users: Arc<Mutex<HashMap<String, Arc<OnceCell<FavoritesSync>>>>>,
}

impl std::fmt::Debug for FavoritesRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesRegistry")
            .field("users", &self.len())
            .finish()
    }
}

impl FavoritesRegistry {
    pub fn new(store: Arc<dyn FavoritesStore>) -> Self {
        Self {
            store,
            users: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn users(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<FavoritesSync>>>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Favorites for `session`. Signed-out sessions get a fresh, empty instance.
    pub async fn sync_for(&self, session: &SessionState) -> FavoritesSync {
        let Some(user) = session.user() else {
            return FavoritesSync::new(self.store.clone());
        };
        let cell = self.users().entry(user.uid.clone()).or_default().clone();
        let loaded = cell
            .get_or_try_init(|| async {
                let sync = FavoritesSync::new(self.store.clone());
                match sync
                    .apply_session(SessionState::Authenticated(user.clone()))
                    .await
                {
                    Ok(()) => Ok(sync),
                    Err(_) => Err(sync),
                }
            })
            .await;
        match loaded {
            Ok(sync) => sync.clone(),
            Err(unloaded) => unloaded,
        }
    }

    /// Drops the cached state for `uid`; the next request reloads from the store.
    pub fn forget(&self, uid: &str) {
        if self.users().remove(uid).is_some() {
            debug!("Dropped cached favorites for {}", uid);
        }
    }

    pub fn len(&self) -> usize {
        self.users().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn run_writer(store: Arc<dyn FavoritesStore>, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = rx.recv().await {
        let result = store
            .save(&job.uid, &job.favorites)
            .await
            .map_err(|reason| FavoritesError::Save {
                uid: job.uid.clone(),
                reason,
            });
        match &result {
            Ok(()) => debug!("Saved {} favorites for {}", job.favorites.len(), job.uid),
            Err(e) => error!("{}", e),
        }
        // The caller may have dropped its PendingWrite; that is fine.
        let _ = job.done.send(result);
    }
}
