use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};

use super::stars::render_stars;
use super::{escape, Navigation};
use crate::auth::{SessionObserver, SessionState, Subscription};
use crate::media::{MediaResource, MediaStatus};
use crate::models::{MediaBundle, MediaType};
use crate::tmdb::{image_url, trailer_url};

/// `Loading -> Error | Ready`, exactly as reported by the media loader.
pub type OverviewState = MediaStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNow {
    Redirect(Navigation),
    /// Open in a new browsing context.
    OpenTrailer(String),
    Nothing,
}

#[derive(Debug)]
pub struct MediaOverview {
    resource: MediaResource,
    session: Arc<Mutex<SessionState>>,
    subscription: Option<Subscription>,
    trailer: OnceCell<Option<String>>,
}

impl MediaOverview {
    pub fn mount(resource: MediaResource, session: &SessionObserver) -> Self {
        // Seeded so Watch Now is correct before the first notification lands.
        let slot = Arc::new(Mutex::new(session.current()));
        let sink = slot.clone();
        let subscription = session.subscribe(move |state| {
            let sink = sink.clone();
            async move {
                if let Ok(mut current) = sink.lock() {
                    *current = state;
                }
            }
        });
        Self {
            resource,
            session: slot,
            subscription: Some(subscription),
            trailer: OnceCell::new(),
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.resource.media_type()
    }

    pub fn state(&self) -> OverviewState {
        self.resource.status()
    }

    pub async fn settled(&self) -> OverviewState {
        self.resource.settled().await
    }

    fn signed_in(&self) -> bool {
        self.session
            .lock()
            .map(|s| s.user().is_some())
            .unwrap_or(false)
    }

    /// Derived on the first call after the media is ready, then reused.
    pub fn trailer_url(&self) -> Option<&str> {
        if let Some(cached) = self.trailer.get() {
            return cached.as_deref();
        }
        match self.resource.status() {
            MediaStatus::Ready(bundle) => self
                .trailer
                .get_or_init(|| trailer_url(&bundle.videos))
                .as_deref(),
            _ => None,
        }
    }

    pub fn watch_now(&self) -> WatchNow {
        if !self.signed_in() {
            return WatchNow::Redirect(Navigation::Login);
        }
        match self.trailer_url() {
            Some(url) => WatchNow::OpenTrailer(url.to_string()),
            None => WatchNow::Nothing,
        }
    }

    pub fn render(&self) -> String {
        match self.state() {
            MediaStatus::Loading => render_skeleton(),
            MediaStatus::Error(message) => {
                format!("<p class=\"error\">Error: {}</p>", escape(&message))
            }
            MediaStatus::Ready(bundle) => self.render_ready(&bundle),
        }
    }

    fn render_ready(&self, bundle: &MediaBundle) -> String {
        let media = &bundle.media;
        let media_type = self.media_type();
        let title = escape(media.display_title());

        let genres: String = media
            .genres
            .iter()
            .map(|g| {
                format!(
                    "<span class=\"genre\" data-id=\"{}\">{}</span>",
                    g.id,
                    escape(&g.name)
                )
            })
            .collect();

        let watch_href = format!("/overview/{}/{}/watch", media_type, self.resource.id());
        // Only the trailer opens in a new browsing context; the login redirect stays in this tab.
        let watch_target = match self.watch_now() {
            WatchNow::OpenTrailer(_) => " target=\"_blank\" rel=\"noopener\"",
            WatchNow::Redirect(_) | WatchNow::Nothing => "",
        };

        let mut html = format!(
            "<section class=\"overview\">\
             <div class=\"poster\"><img src=\"{poster}\" alt=\"{title}\"></div>\
             <div class=\"detail\"><h1>{title}</h1><hr>\
             <p class=\"synopsis\">{overview}</p>\
             <div class=\"genres\">{genres}</div>\
             <div class=\"facts\">\
             <p>Release Date: <span class=\"release-date\">{release}</span></p>\
             <div>Rating: {rating}</div>\
             <p>Status: <span class=\"status\">{status}</span></p>\
             <p>Popularity: <span class=\"popularity\">{popularity}</span></p>\
             </div>\
             <a class=\"watch-now\" href=\"{watch_href}\"{watch_target}>Watch Now</a>\
             </div></section>",
            poster = escape(&image_url(media.poster_path.as_deref())),
            title = title,
            overview = escape(&media.overview),
            genres = genres,
            release = escape(media.release_date_for(media_type).unwrap_or_default()),
            rating = render_stars(media.vote_average),
            status = escape(media.status.as_deref().unwrap_or_default()),
            popularity = media.popularity,
            watch_href = watch_href,
            watch_target = watch_target,
        );

        html.push_str("<section class=\"cast\"><h2>Cast</h2>");
        if !bundle.cast.is_empty() {
            html.push_str("<div class=\"carousel\"><button class=\"carousel-prev\" aria-label=\"Previous\">&lsaquo;</button><ul class=\"carousel-content\">");
            for actor in &bundle.cast {
                html.push_str(&format!(
                    "<li class=\"carousel-item\" data-key=\"{key}\"><div class=\"cast-card\">\
                     <img class=\"profile\" src=\"{img}\" alt=\"{name}\" width=\"208\" height=\"208\">\
                     <p class=\"cast-name\">{name}</p><p class=\"cast-character\">{character}</p>\
                     </div></li>",
                    key = actor.carousel_key(),
                    img = escape(&image_url(actor.profile_path.as_deref())),
                    name = escape(&actor.name),
                    character = escape(&actor.character_name),
                ));
            }
            html.push_str("</ul><button class=\"carousel-next\" aria-label=\"Next\">&rsaquo;</button></div>");
        }
        html.push_str("</section>");
        html
    }

    pub fn unmount(mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.is_active())
    }
}

fn render_skeleton() -> String {
    "<section class=\"overview-skeleton\" aria-busy=\"true\">\
     <div class=\"skeleton skeleton-poster\"></div>\
     <div class=\"skeleton skeleton-title\"></div>\
     <div class=\"skeleton skeleton-line\"></div>\
     <div class=\"skeleton skeleton-line\"></div>\
     <div class=\"skeleton skeleton-button\"></div>\
     </section>"
        .to_string()
}
