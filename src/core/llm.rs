use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Boundary to the text/vision generation service: one prompt in, one raw
/// response out. Implementations must carry their own request timeout.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image_png: Option<&[u8]>,
    ) -> Result<String, GenerationError>;
}

// ── Ollama request/response ──

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaClient {
    api_url: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image_png: Option<&[u8]>,
    ) -> Result<String, GenerationError> {
        let images = image_png
            .map(|png| vec![base64::engine::general_purpose::STANDARD.encode(png)]);
        let req = OllamaRequest {
            model,
            prompt,
            images,
            stream: false,
        };

        let res = self.client.post(&self.api_url).json(&req).send().await?;
        if !res.status().is_success() {
            return Err(GenerationError::Status {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        let parsed: OllamaResponse = res
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        Ok(parsed.response)
    }
}
