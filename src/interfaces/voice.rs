use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Remote speech-recognition service, fetched and cleared once per cycle so
/// each fragment reaches exactly one snapshot.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch_transcript(&self) -> Result<String>;
    async fn clear_transcript(&self) -> Result<()>;
}

#[derive(Deserialize)]
struct TranscriptPayload {
    #[serde(default)]
    text: String,
}

pub struct VoiceServerClient {
    base_url: String,
    client: Client,
}

impl VoiceServerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("building voice server client")?,
        })
    }
}

#[async_trait]
impl TranscriptSource for VoiceServerClient {
    async fn fetch_transcript(&self) -> Result<String> {
        let res = self
            .client
            .get(format!("{}/transcript", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        let payload: TranscriptPayload = res.json().await?;
        Ok(payload.text)
    }

    async fn clear_transcript(&self) -> Result<()> {
        self.client
            .post(format!("{}/clear", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
