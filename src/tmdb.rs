use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::models::{CastMember, MediaBundle, MediaId, MediaItem, MediaType, Video};

const TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const YOUTUBE_WATCH: &str = "https://www.youtube.com/watch?v=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Popular,
    TopRated,
    Trending,
}

impl FromStr for Catalog {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "popular" => Ok(Catalog::Popular),
            "top_rated" => Ok(Catalog::TopRated),
            "trending" => Ok(Catalog::Trending),
            _ => Err(anyhow!("unknown catalog '{}'", s)),
        }
    }
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn fetch_media(&self, media_type: MediaType, id: MediaId) -> Result<MediaBundle>;
    async fn fetch_catalog(&self, media_type: MediaType, catalog: Catalog)
        -> Result<Vec<MediaItem>>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let user_agent = format!("cinefave/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    async fn fetch_appended(&self, media_type: MediaType, id: MediaId) -> Result<MediaAppended> {
        let url = format!(
            "{TMDB_BASE}/{media_type}/{id}?append_to_response=credits,videos&language=en-US&api_key={}",
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn fetch_separately(&self, media_type: MediaType, id: MediaId) -> Result<MediaAppended> {
        let url_detail = format!(
            "{TMDB_BASE}/{media_type}/{id}?language=en-US&api_key={}",
            self.api_key
        );
        let url_credits = format!("{TMDB_BASE}/{media_type}/{id}/credits?api_key={}", self.api_key);
        let url_videos = format!("{TMDB_BASE}/{media_type}/{id}/videos?api_key={}", self.api_key);

        let (detail, credits, videos) = tokio::try_join!(
            self.get_json::<MediaItem>(&url_detail),
            self.get_json::<Credits>(&url_credits),
            self.get_json::<Videos>(&url_videos),
        )?;
        Ok(MediaAppended {
            detail,
            credits,
            videos,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("TMDB returned {}: {}", status, status_message(&text)));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn fetch_media(&self, media_type: MediaType, id: MediaId) -> Result<MediaBundle> {
        // One round trip when append_to_response works, three concurrent ones otherwise.
        let data = match self.fetch_appended(media_type, id).await {
            Ok(a) => a,
            Err(e) => {
                debug!("append_to_response failed for {} {}: {}", media_type, id, e);
                self.fetch_separately(media_type, id).await?
            }
        };
        Ok(MediaBundle {
            media: data.detail,
            cast: data.credits.cast,
            videos: data.videos.results,
        })
    }

    async fn fetch_catalog(
        &self,
        media_type: MediaType,
        catalog: Catalog,
    ) -> Result<Vec<MediaItem>> {
        #[derive(Deserialize)]
        struct Page {
            results: Vec<MediaItem>,
        }

        let path = match catalog {
            Catalog::Popular => format!("{media_type}/popular"),
            Catalog::TopRated => format!("{media_type}/top_rated"),
            Catalog::Trending => format!("trending/{media_type}/week"),
        };
        let url = format!("{TMDB_BASE}/{path}?language=en-US&page=1&api_key={}", self.api_key);
        let page: Page = self.get_json(&url).await?;
        Ok(page.results)
    }
}

#[derive(Debug, Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastMember>,
}

#[derive(Debug, Deserialize)]
struct Videos {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct MediaAppended {
    #[serde(flatten)]
    detail: MediaItem,
    credits: Credits,
    videos: Videos,
}

fn status_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        status_message: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.status_message)
        .unwrap_or_else(|_| body.to_string())
}

/// First YouTube trailer wins; teasers and clips are never used.
pub fn trailer_url(videos: &[Video]) -> Option<String> {
    videos
        .iter()
        .find(|v| v.video_type == "Trailer" && v.site == "YouTube")
        .map(|v| format!("{YOUTUBE_WATCH}{}", v.key))
}

pub fn image_url(path: Option<&str>) -> String {
    format!("{IMAGE_BASE}{}", path.unwrap_or_default())
}
