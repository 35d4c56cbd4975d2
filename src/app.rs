use crate::auth::{FirebaseIdentity, IdentityApi, SessionObserver};
use crate::components::{
    page, CardGrid, MediaOverview, Navigation, WatchNow, LOGIN_ROUTE,
};
use crate::config::Config;
use crate::favorites::{FavoritesRegistry, FavoritesStore, Toggle};
use crate::firestore::FirestoreClient;
use crate::media::MediaResource;
use crate::models::{MediaId, MediaType};
use crate::session::{SessionKeys, SESSION_COOKIE};
use crate::tmdb::{Catalog, TmdbApi, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub favorites: FavoritesRegistry,
    pub identity: Arc<dyn IdentityApi>,
    pub sessions: SessionKeys,
}

impl AppState {
    pub fn new(
        tmdb: Arc<dyn TmdbApi>,
        store: Arc<dyn FavoritesStore>,
        identity: Arc<dyn IdentityApi>,
        sessions: SessionKeys,
    ) -> Self {
        Self {
            tmdb,
            favorites: FavoritesRegistry::new(store),
            identity,
            sessions,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::new(&config.tmdb_api_key)?);
        let favorites: Arc<dyn FavoritesStore> = Arc::new(FirestoreClient::new(
            &config.firebase_project_id,
            &config.firebase_api_key,
            config.firestore_access_token.clone(),
        )?);
        let identity: Arc<dyn IdentityApi> =
            Arc::new(FirebaseIdentity::new(&config.firebase_api_key)?);
        Ok(Self::new(
            tmdb,
            favorites,
            identity,
            SessionKeys::new(&config.session_secret, config.session_ttl_hours),
        ))
    }

    /// A fresh observer seeded from the request's session cookie or bearer token.
    fn session_for(
        &self,
        jar: &CookieJar,
        bearer: Option<&TypedHeader<Authorization<Bearer>>>,
    ) -> SessionObserver {
        let token = bearer
            .map(|b| b.token().to_string())
            .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()));
        SessionObserver::new(self.sessions.session_state(token.as_deref()))
    }
}

pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    info!("Using Firebase project {}", config.firebase_project_id);
    let state = AppState::from_config(&config)?;

    let app = build_router(state);

    info!("Listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(movies_home))
        .route("/tv", get(tv_home))
        .route("/catalog/:mediatype/:list", get(catalog))
        .route("/moviesOverview/:id", get(movie_overview))
        .route("/overview/:mediatype/:id", get(overview))
        .route("/overview/:mediatype/:id/watch", get(watch_now))
        .route("/favorites", get(list_favorites))
        .route("/favorites/:id", post(toggle_favorite))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

async fn movies_home(
    State(state): State<AppState>,
    jar: CookieJar,
    bearer: BearerHeader,
) -> Response {
    let session = state.session_for(&jar, bearer.as_ref());
    render_catalog(&state, &session, MediaType::Movie, Catalog::Popular).await
}

async fn tv_home(State(state): State<AppState>, jar: CookieJar, bearer: BearerHeader) -> Response {
    let session = state.session_for(&jar, bearer.as_ref());
    render_catalog(&state, &session, MediaType::Tv, Catalog::Popular).await
}

async fn catalog(
    State(state): State<AppState>,
    Path((mediatype, list)): Path<(String, String)>,
    jar: CookieJar,
    bearer: BearerHeader,
) -> Response {
    let (Ok(media_type), Ok(catalog)) = (mediatype.parse::<MediaType>(), list.parse::<Catalog>())
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let session = state.session_for(&jar, bearer.as_ref());
    render_catalog(&state, &session, media_type, catalog).await
}

async fn render_catalog(
    state: &AppState,
    session: &SessionObserver,
    media_type: MediaType,
    catalog: Catalog,
) -> Response {
    let items = match state.tmdb.fetch_catalog(media_type, catalog).await {
        Ok(items) => items,
        Err(e) => {
            warn!("Failed to fetch {:?} {} catalog: {:#}", catalog, media_type, e);
            let body = format!(
                "<p class=\"error\">Error: {}</p>",
                crate::components::escape(&e.to_string())
            );
            return (StatusCode::BAD_GATEWAY, Html(page("Error", &body))).into_response();
        }
    };

    let favorites = state.favorites.sync_for(&session.current()).await;
    let grid = CardGrid::attach(items, media_type, session, favorites).await;
    let html = page("cinefave", &grid.render());
    grid.unmount();
    Html(html).into_response()
}

async fn movie_overview(
    State(state): State<AppState>,
    Path(id): Path<MediaId>,
    jar: CookieJar,
    bearer: BearerHeader,
) -> Response {
    let session = state.session_for(&jar, bearer.as_ref());
    render_overview(&state, &session, MediaType::Movie, id).await
}

async fn overview(
    State(state): State<AppState>,
    Path((mediatype, id)): Path<(String, MediaId)>,
    jar: CookieJar,
    bearer: BearerHeader,
) -> Response {
    let Ok(media_type) = mediatype.parse::<MediaType>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let session = state.session_for(&jar, bearer.as_ref());
    render_overview(&state, &session, media_type, id).await
}

async fn mount_overview(
    state: &AppState,
    session: &SessionObserver,
    media_type: MediaType,
    id: MediaId,
) -> MediaOverview {
    let resource = MediaResource::load(state.tmdb.clone(), media_type, id);
    let overview = MediaOverview::mount(resource, session);
    overview.settled().await;
    overview
}

async fn render_overview(
    state: &AppState,
    session: &SessionObserver,
    media_type: MediaType,
    id: MediaId,
) -> Response {
    let overview = mount_overview(state, session, media_type, id).await;
    let html = page("cinefave", &overview.render());
    overview.unmount();
    Html(html).into_response()
}

async fn watch_now(
    State(state): State<AppState>,
    Path((mediatype, id)): Path<(String, MediaId)>,
    jar: CookieJar,
    bearer: BearerHeader,
) -> Response {
    let Ok(media_type) = mediatype.parse::<MediaType>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let session = state.session_for(&jar, bearer.as_ref());
    let overview = mount_overview(&state, &session, media_type, id).await;
    let action = overview.watch_now();
    overview.unmount();
    match action {
        WatchNow::Redirect(nav) => Redirect::to(nav.location()).into_response(),
        WatchNow::OpenTrailer(url) => Redirect::to(&url).into_response(),
        WatchNow::Nothing => {
            Redirect::to(&format!("/overview/{}/{}", media_type, id)).into_response()
        }
    }
}

/// Toggles one favorite for the session's user.
///
/// Heart forms get a redirect back to the page they were posted from; clients
/// asking for JSON get the new state and whether it was persisted.
async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<MediaId>,
    jar: CookieJar,
    bearer: BearerHeader,
    headers: HeaderMap,
) -> Response {
    let session = state.session_for(&jar, bearer.as_ref()).current();
    let favorites = state.favorites.sync_for(&session).await;
    match favorites.toggle(id) {
        Toggle::LoginRequired => Redirect::to(Navigation::Login.location()).into_response(),
        Toggle::Applied { .. } if !wants_json(&headers) => {
            Redirect::to(&return_path(&headers)).into_response()
        }
        Toggle::Applied {
            media_id,
            favorite,
            write,
        } => {
            let saved = match write.outcome().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Favorite change for {} not persisted: {}", media_id, e);
                    false
                }
            };
            Json(json!({ "id": media_id, "favorite": favorite, "saved": saved })).into_response()
        }
    }
}

async fn list_favorites(
    State(state): State<AppState>,
    jar: CookieJar,
    bearer: BearerHeader,
) -> Response {
    let session = state.session_for(&jar, bearer.as_ref()).current();
    if session.user().is_none() {
        return Redirect::to(LOGIN_ROUTE).into_response();
    }
    let favorites = state.favorites.sync_for(&session).await.snapshot();
    Json(json!({ "favorites": favorites.ids() })).into_response()
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// Path of the referring page on this site, or the home grid.
fn return_path(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(local_path)
        .unwrap_or_else(|| "/".to_string())
}

fn local_path(referer: &str) -> Option<String> {
    let path = match referer.find("://") {
        Some(i) => {
            let rest = &referer[i + 3..];
            &rest[rest.find('/')?..]
        }
        None => referer,
    };
    (path.starts_with('/') && !path.starts_with("//")).then(|| path.to_string())
}

async fn login_page() -> Html<String> {
    Html(page(
        "Sign in",
        "<section class=\"login\"><h1>Sign in</h1>\
         <p>Sign in with your account, then exchange the ID token at <code>POST /login</code>.</p>\
         </section>",
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub id_token: String,
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let user = match state.identity.lookup(&payload.id_token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Login rejected: {:#}", e);
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "error", "message": "Invalid credentials" })),
            )
                .into_response();
        }
    };
    let value = match state.sessions.issue(&user.uid) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to issue session: {:#}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    info!("User {} signed in", user.uid);
    // Start from the stored list; another device may have changed it.
    state.favorites.forget(&user.uid);
    let cookie = Cookie::build((SESSION_COOKIE, value.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (
        jar.add(cookie),
        Json(json!({
            "status": "success",
            "uid": user.uid,
            "token": value,
            "expires_in": state.sessions.ttl_seconds(),
        })),
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(uid) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| state.sessions.verify(c.value()))
    {
        state.favorites.forget(&uid);
    }
    let cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (jar.remove(cookie), StatusCode::OK)
}


async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
