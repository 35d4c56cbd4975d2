use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::favorites::FavoritesStore;
use crate::models::MediaId;

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";
const USERS_COLLECTION: &str = "users";
const FAVORITES_FIELD: &str = "favorites";

/// Firestore REST adapter for `users/{uid}` documents.
#[derive(Debug, Clone)]
pub struct FirestoreClient {
    client: Client,
    project_id: String,
    api_key: String,
    access_token: Option<String>,
}

impl FirestoreClient {
    pub fn new(
        project_id: impl Into<String>,
        api_key: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Firestore HTTP client")?;
        Ok(Self {
            client,
            project_id: project_id.into(),
            api_key: api_key.into(),
            access_token,
        })
    }

    fn document_url(&self, uid: &str) -> String {
        format!(
            "{FIRESTORE_BASE}/projects/{}/databases/(default)/documents/{USERS_COLLECTION}/{}",
            self.project_id,
            urlencoding::encode(uid)
        )
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.query(&[("key", self.api_key.as_str())]);
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Raw document fetch, `None` when the document does not exist.
    pub async fn fetch_document(&self, uid: &str) -> Result<Option<Value>> {
        let res = self
            .authorize(self.client.get(self.document_url(uid)))
            .send()
            .await
            .context("Firestore read failed")?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = res.text().await.context("reading Firestore body failed")?;
        if !status.is_success() {
            return Err(anyhow!("Firestore read returned {}: {}", status, text));
        }
        let doc: Value = serde_json::from_str(&text).context("Firestore JSON parse failed")?;
        Ok(Some(doc))
    }
}

#[async_trait]
impl FavoritesStore for FirestoreClient {
    async fn load(&self, uid: &str) -> Result<Vec<MediaId>> {
        match self.fetch_document(uid).await? {
            Some(doc) => decode_favorites(&doc),
            None => {
                debug!("No user document for {}", uid);
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, uid: &str, favorites: &[MediaId]) -> Result<()> {
        // updateMask makes this a merge: other fields on the document survive.
        let req = self
            .client
            .patch(self.document_url(uid))
            .query(&[("updateMask.fieldPaths", FAVORITES_FIELD)])
            .json(&encode_favorites(favorites));
        let res = self
            .authorize(req)
            .send()
            .await
            .context("Firestore write failed")?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("Firestore write returned {}: {}", status, text));
        }
        Ok(())
    }
}

pub fn encode_favorites(favorites: &[MediaId]) -> Value {
    let values: Vec<Value> = favorites
        .iter()
        .map(|id| json!({ "integerValue": id.to_string() }))
        .collect();
    let array = if values.is_empty() {
        json!({})
    } else {
        json!({ "values": values })
    };
    json!({
        "fields": {
            FAVORITES_FIELD: { "arrayValue": array }
        }
    })
}

/// Reads `fields.favorites` from a Firestore document.
///
/// Integer values arrive as decimal strings. Doubles and plain strings are
/// accepted too, since documents written by other clients are not uniform.
pub fn decode_favorites(doc: &Value) -> Result<Vec<MediaId>> {
    let Some(field) = doc.get("fields").and_then(|f| f.get(FAVORITES_FIELD)) else {
        return Ok(Vec::new());
    };
    let values = field
        .get("arrayValue")
        .ok_or_else(|| anyhow!("favorites field is not an array"))?
        .get("values")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    values
        .iter()
        .map(|v| {
            if let Some(s) = v.get("integerValue").and_then(|x| x.as_str()) {
                return s.parse::<MediaId>().context("bad integerValue");
            }
            if let Some(n) = v.get("integerValue").and_then(|x| x.as_i64()) {
                return Ok(n);
            }
            if let Some(d) = v.get("doubleValue").and_then(|x| x.as_f64()) {
                return Ok(d as MediaId);
            }
            if let Some(s) = v.get("stringValue").and_then(|x| x.as_str()) {
                return s.parse::<MediaId>().context("bad stringValue");
            }
            Err(anyhow!("unsupported favorites entry: {}", v))
        })
        .collect()
}
