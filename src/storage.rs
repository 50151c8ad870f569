//! Object-storage collaborator for avatar images.
//!
//! The daemon only ever stores the durable URL the service hands back;
//! image bytes never touch the database.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;
use zeroize::Zeroize;

use crate::config::StorageConfig;
use crate::traits::MediaStorage;

pub struct HttpMediaStorage {
    client: Client,
    upload_url: String,
    api_key: String,
}

impl Drop for HttpMediaStorage {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl HttpMediaStorage {
    pub fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            upload_url: config.upload_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl MediaStorage for HttpMediaStorage {
    async fn store_avatar(&self, uid: &str, data_url: &str) -> anyhow::Result<String> {
        let mut req = self.client.post(&self.upload_url).json(&json!({
            "file": data_url,
            "folder": "avatars",
            "public_id": format!("avatar_{uid}"),
            "overwrite": true,
        }));
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("Avatar upload failed ({}): {}", status, body);
        }

        let url = body["secure_url"]
            .as_str()
            .or_else(|| body["url"].as_str())
            .ok_or_else(|| anyhow::anyhow!("Upload response missing URL"))?;

        info!(uid, "Avatar uploaded");
        Ok(url.to_string())
    }
}
