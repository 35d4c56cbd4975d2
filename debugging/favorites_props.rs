//! Print the favorites stored for one user, plus the raw document fields.
//! Usage:
//!   cargo run --bin favorites_props -- <uid>
//! Uses FIREBASE_PROJECT_ID, FIREBASE_API_KEY and optional FIRESTORE_ACCESS_TOKEN (.env supported).

use anyhow::{Context, Result};
use cinefave::firestore::{decode_favorites, FirestoreClient};
use dotenvy::dotenv;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present for local runs.
    dotenv().ok();

    let uid = env::args().nth(1).context("usage: favorites_props <uid>")?;
    let project_id =
        env::var("FIREBASE_PROJECT_ID").context("Missing FIREBASE_PROJECT_ID in environment")?;
    let api_key = env::var("FIREBASE_API_KEY").context("Missing FIREBASE_API_KEY in environment")?;
    let token = env::var("FIRESTORE_ACCESS_TOKEN").ok();

    let client = FirestoreClient::new(project_id, api_key, token)?;
    let Some(doc) = client.fetch_document(&uid).await? else {
        println!("No document for {}", uid);
        return Ok(());
    };

    if let Some(fields) = doc.get("fields").and_then(|f| f.as_object()) {
        for name in fields.keys() {
            println!("field: {}", name);
        }
    }
    let favorites = decode_favorites(&doc)?;
    println!("favorites ({}): {:?}", favorites.len(), favorites);
    Ok(())
}
