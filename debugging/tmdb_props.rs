//! Fetch a TMDB title the way the overview page does and print what it would show.
//! Usage:
//!   cargo run --bin tmdb_props -- movie <tmdb_id>
//!   cargo run --bin tmdb_props -- tv <tmdb_id>
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{Context, Result};
use cinefave::models::{MediaId, MediaType};
use cinefave::tmdb::{image_url, trailer_url, TmdbApi, TmdbClient};
use dotenvy::dotenv;
use serde_json::json;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let mut args = env::args().skip(1);
    let media_type: MediaType = args
        .next()
        .context("usage: tmdb_props <movie|tv> <tmdb_id>")?
        .parse()?;
    let id: MediaId = args
        .next()
        .context("missing tmdb id")?
        .parse()
        .context("tmdb id must be numeric")?;

    let api_key = env::var("TMDB_API_KEY").context("Missing TMDB_API_KEY in environment")?;
    let tmdb = TmdbClient::new(api_key)?;
    let bundle = tmdb.fetch_media(media_type, id).await?;
    let media = &bundle.media;

    let summary = json!({
        "id": media.id,
        "title": media.display_title(),
        "poster": image_url(media.poster_path.as_deref()),
        "genres": media.genres.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
        "release_date": media.release_date_for(media_type),
        "vote_average": media.vote_average,
        "status": media.status,
        "popularity": media.popularity,
        "trailer": trailer_url(&bundle.videos),
        "videos": bundle.videos.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    for actor in bundle.cast.iter().take(10) {
        println!("{} as {}", actor.name, actor.character_name);
    }

    Ok(())
}
