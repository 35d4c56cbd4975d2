use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use tracing::info;

const DEFAULT_ADDR: &str = "0.0.0.0:3146";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

pub const REQUIRED_VARS: [&str; 4] = [
    "TMDB_API_KEY",
    "FIREBASE_PROJECT_ID",
    "FIREBASE_API_KEY",
    "SESSION_SECRET",
];

#[derive(Clone)]
pub struct Config {
    pub tmdb_api_key: String,
    pub firebase_project_id: String,
    pub firebase_api_key: String,
    pub firestore_access_token: Option<String>,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub addr: SocketAddr,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("firebase_project_id", &self.firebase_project_id)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        check_env()?;
        let addr = env::var("CINEFAVE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("CINEFAVE_ADDR is not a socket address: {}", addr))?;
        let session_ttl_hours = match env::var("SESSION_TTL_HOURS") {
            Ok(v) => v
                .parse::<i64>()
                .context("SESSION_TTL_HOURS must be a whole number of hours")?
                .max(1),
            Err(_) => DEFAULT_SESSION_TTL_HOURS,
        };
        Ok(Self {
            tmdb_api_key: required("TMDB_API_KEY")?,
            firebase_project_id: required("FIREBASE_PROJECT_ID")?,
            firebase_api_key: required("FIREBASE_API_KEY")?,
            firestore_access_token: env::var("FIRESTORE_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            session_secret: required("SESSION_SECRET")?,
            session_ttl_hours,
            addr,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .with_context(|| format!("{} must be set", key))
}

pub fn check_env() -> Result<()> {
    for key in REQUIRED_VARS {
        if env::var(key).map(|v| v.is_empty()).unwrap_or(true) {
            anyhow::bail!("Missing required environment variable: {}", key);
        }
    }
    info!("All required environment variables are set");
    Ok(())
}
