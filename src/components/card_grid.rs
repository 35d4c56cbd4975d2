use std::sync::Arc;
use tracing::debug;

use super::stars::{render_stars, stars, Stars};
use super::{escape, overview_route, Navigation};
use crate::auth::{SessionObserver, Subscription};
use crate::favorites::{FavoritesStore, FavoritesSync, Toggle};
use crate::models::{MediaId, MediaItem, MediaType};
use crate::tmdb::image_url;

const HEART_FILLED: &str = "/assets/heartFill.svg";
const HEART_OUTLINE: &str = "/assets/heart.svg";

/// What one card shows, independent of markup.
#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub id: MediaId,
    pub title: String,
    pub poster_url: String,
    pub stars: Stars,
    pub favorite: bool,
    pub href: String,
}

/// Grid of media cards with a per-card favorite toggle.
#[derive(Debug)]
pub struct CardGrid {
    items: Vec<MediaItem>,
    media_type: MediaType,
    favorites: FavoritesSync,
    subscription: Option<Subscription>,
}

impl CardGrid {
    /// Subscribes to session changes and loads the signed-in user's favorites.
    ///
    /// Returns once favorites for the session current at mount time have been
    /// loaded (or the load has failed and been logged).
    pub async fn mount(
        items: Vec<MediaItem>,
        media_type: MediaType,
        session: &SessionObserver,
        store: Arc<dyn FavoritesStore>,
    ) -> Self {
        Self::attach(items, media_type, session, FavoritesSync::new(store)).await
    }

    /// Like [`CardGrid::mount`], but over favorites state that outlives the grid.
    pub async fn attach(
        items: Vec<MediaItem>,
        media_type: MediaType,
        session: &SessionObserver,
        favorites: FavoritesSync,
    ) -> Self {
        let sync = favorites.clone();
        let subscription = session.subscribe_changes(move |state| {
            let sync = sync.clone();
            async move {
                // Failures are logged by the sync itself.
                let _ = sync.apply_session(state).await;
            }
        });
        let _ = favorites.apply_session(session.current()).await;
        Self {
            items,
            media_type,
            favorites,
            subscription: Some(subscription),
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn favorites(&self) -> &FavoritesSync {
        &self.favorites
    }

    pub fn is_favorite(&self, id: MediaId) -> bool {
        self.favorites.contains(id)
    }

    pub fn toggle_favorite(&self, id: MediaId) -> Toggle {
        let outcome = self.favorites.toggle(id);
        if let Toggle::Applied { favorite, .. } = &outcome {
            debug!("Favorite {} -> {}", id, favorite);
        }
        outcome
    }

    /// Clicking anywhere on a card except the heart opens the overview.
    pub fn click_card(&self, id: MediaId) -> Navigation {
        Navigation::Route(overview_route(self.media_type, id))
    }

    pub fn cards(&self) -> Vec<CardView> {
        let favorites = self.favorites.snapshot();
        self.items
            .iter()
            .map(|item| CardView {
                id: item.id,
                title: item.display_title().to_string(),
                poster_url: image_url(item.poster_path.as_deref()),
                stars: stars(item.vote_average),
                favorite: favorites.contains(item.id),
                href: overview_route(self.media_type, item.id),
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let mut html = String::from("<div class=\"card-grid\">");
        for (item, card) in self.items.iter().zip(self.cards()) {
            let (heart, state) = if card.favorite {
                (HEART_FILLED, "filled")
            } else {
                (HEART_OUTLINE, "outline")
            };
            html.push_str(&format!(
                "<article class=\"card\" data-id=\"{id}\">\
                 <header class=\"card-header\">\
                 <a href=\"{href}\"><img class=\"poster\" src=\"{poster}\" alt=\"{title}\"></a>\
                 <form method=\"post\" action=\"/favorites/{id}\">\
                 <button type=\"submit\" class=\"heart {state}\" data-favorite=\"{favorite}\">\
                 <img src=\"{heart}\" alt=\"heart\"></button></form>\
                 </header><hr>\
                 <div class=\"card-content\"><h3 class=\"card-title\">{title}</h3>\
                 <div class=\"rating\"><p>Rating:</p><p>{rating}</p></div></div>\
                 </article>",
                id = card.id,
                href = escape(&card.href),
                poster = escape(&card.poster_url),
                title = escape(&card.title),
                state = state,
                favorite = card.favorite,
                heart = heart,
                rating = render_stars(item.vote_average),
            ));
        }
        html.push_str("</div>");
        html
    }

    /// Cancels the session subscription. Queued favorites writes still complete.
    pub fn unmount(mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.is_active())
    }
}
