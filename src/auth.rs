//! Auth session observation and identity lookup.
//!
//! [`SessionObserver`] is the in-process source of truth for "who is signed
//! in". Components subscribe to it and receive the current state immediately,
//! then every later change, until they unsubscribe.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

const IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
}

impl User {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(User),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            SessionState::Unauthenticated => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionObserver {
    tx: watch::Sender<SessionState>,
}

impl Default for SessionObserver {
    fn default() -> Self {
        Self::new(SessionState::Unauthenticated)
    }
}

impl SessionObserver {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn sign_in(&self, user: User) {
        self.set(SessionState::Authenticated(user));
    }

    pub fn sign_out(&self) {
        self.set(SessionState::Unauthenticated);
    }

    fn set(&self, next: SessionState) {
        self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Calls `on_change` with the current state, then once per change.
    ///
    /// Callbacks run sequentially on a dedicated task, so a slow callback delays
    /// later notifications instead of overlapping with them.
    pub fn subscribe<F, Fut>(&self, mut on_change: F) -> Subscription
    where
        F: FnMut(SessionState) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            let first = rx.borrow_and_update().clone();
            on_change(first).await;
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                on_change(next).await;
            }
        });
        Subscription { task: Some(task) }
    }

    /// Subscription that skips the initial state and only sees later changes.
    pub fn subscribe_changes<F, Fut>(&self, mut on_change: F) -> Subscription
    where
        F: FnMut(SessionState) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // A fresh receiver already treats the current value as seen.
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                on_change(next).await;
            }
        });
        Subscription { task: Some(task) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Handle returned by [`SessionObserver::subscribe`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Resolves identity-provider tokens to users.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn lookup(&self, id_token: &str) -> Result<User>;
}

#[derive(Debug, Clone)]
pub struct FirebaseIdentity {
    client: Client,
    api_key: String,
}

impl FirebaseIdentity {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build identity HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl IdentityApi for FirebaseIdentity {
    async fn lookup(&self, id_token: &str) -> Result<User> {
        #[derive(Deserialize)]
        struct LookupResponse {
            #[serde(default)]
            users: Vec<Account>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Account {
            local_id: String,
            email: Option<String>,
        }

        let url = format!("{IDENTITY_BASE}/accounts:lookup?key={}", self.api_key);
        let res = self
            .client
            .post(&url)
            .json(&json!({ "idToken": id_token }))
            .send()
            .await
            .context("identity lookup request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            debug!("Identity lookup rejected: {}", body);
            return Err(anyhow!("identity provider rejected token ({})", status));
        }
        let data: LookupResponse = res.json().await.context("identity JSON parse failed")?;
        let account = data
            .users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("identity provider returned no account"))?;
        Ok(User {
            uid: account.local_id,
            email: account.email,
        })
    }
}
