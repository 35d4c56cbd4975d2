//! Signed session cookies.
//!
//! Cookie value format: `{uid}.{expires_unix}.{hex(hmac_sha256(uid.expires))}`.

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::auth::{SessionState, User};

pub const SESSION_COOKIE: &str = "cinefave_session";

#[derive(Clone)]
pub struct SessionKeys {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    pub fn new(secret: impl AsRef<[u8]>, ttl_hours: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn issue(&self, uid: &str) -> Result<String> {
        let expires = (Utc::now() + self.ttl).timestamp();
        self.sign(uid, expires)
    }

    fn sign(&self, uid: &str, expires: i64) -> Result<String> {
        let payload = format!("{uid}.{expires}");
        let mac = self
            .mac(&payload)
            .ok_or_else(|| anyhow!("invalid session secret"))?;
        Ok(format!("{payload}.{}", hex::encode(mac)))
    }

    fn mac(&self, payload: &str) -> Option<Vec<u8>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret).ok()?;
        mac.update(payload.as_bytes());
        Some(mac.finalize().into_bytes().to_vec())
    }

    /// Returns the uid for a valid, unexpired cookie value.
    pub fn verify(&self, value: &str) -> Option<String> {
        let mut parts = value.rsplitn(3, '.');
        let sig_hex = parts.next()?;
        let expires_str = parts.next()?;
        let uid = parts.next()?;
        if uid.is_empty() {
            return None;
        }

        let expected = hex::decode(sig_hex).ok()?;
        let computed = self.mac(&format!("{uid}.{expires_str}"))?;
        if expected.len() != computed.len() || !constant_time_eq(&computed, &expected) {
            return None;
        }

        let expires: i64 = expires_str.parse().ok()?;
        if Utc::now().timestamp() >= expires {
            return None;
        }
        Some(uid.to_string())
    }

    pub fn session_state(&self, cookie: Option<&str>) -> SessionState {
        match cookie.and_then(|v| self.verify(v)) {
            Some(uid) => SessionState::Authenticated(User::new(uid)),
            None => SessionState::Unauthenticated,
        }
    }
}
