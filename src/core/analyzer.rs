use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::core::llm::GenerationClient;
use crate::error::{AnalysisError, GenerationError};
use crate::interfaces::capture::Frame;

/// What stage 1 concluded about the captured frame.
#[derive(Debug, Clone)]
pub struct SceneDescription {
    pub description: String,
    /// True when the frame shows the observed activity. The service's own
    /// judgment is trusted as returned.
    pub is_relevant: bool,
}

#[derive(Deserialize)]
struct AnalysisPayload {
    #[serde(default)]
    description: String,
    is_game: bool,
}

const ANALYSIS_PROMPT: &str = "You are watching a live game stream. Describe what is happening \
on screen in two or three sentences: the scene, visible UI elements, and anything a viewer \
would react to. Then judge whether the image shows actual gameplay, as opposed to a desktop, \
editor, browser, or other non-game content. Respond with exactly one JSON object of the form \
{\"description\": \"...\", \"is_game\": true} and nothing else.";

/// Stage 1: one vision call per cycle, producing the scene description the
/// synthesis stage fans out over.
pub struct SceneAnalyzer {
    client: Arc<dyn GenerationClient>,
    model: String,
    timeout: Duration,
    fence_re: Regex,
}

impl SceneAnalyzer {
    pub fn new(client: Arc<dyn GenerationClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
            fence_re: Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").unwrap(),
        }
    }

    pub async fn analyze(
        &self,
        frame: &Frame,
        transcript: &str,
    ) -> Result<SceneDescription, AnalysisError> {
        let prompt = build_prompt(transcript);
        let raw = tokio::time::timeout(
            self.timeout,
            self.client.generate(&self.model, &prompt, Some(&frame.png)),
        )
        .await
        .map_err(|_| AnalysisError::Generation(GenerationError::Timeout))??;

        let scene = self.parse_response(&raw)?;
        debug!(
            is_relevant = scene.is_relevant,
            chars = scene.description.len(),
            "scene analyzed"
        );
        Ok(scene)
    }

    fn parse_response(&self, raw: &str) -> Result<SceneDescription, AnalysisError> {
        let candidate = match self.fence_re.captures(raw) {
            Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(raw),
            None => raw,
        };
        let json = match (candidate.find('{'), candidate.rfind('}')) {
            (Some(start), Some(end)) if start < end => &candidate[start..=end],
            _ => return Err(AnalysisError::Malformed(truncate(raw))),
        };
        let payload: AnalysisPayload =
            serde_json::from_str(json).map_err(|_| AnalysisError::Malformed(truncate(raw)))?;
        Ok(SceneDescription {
            description: payload.description,
            is_relevant: payload.is_game,
        })
    }
}

fn build_prompt(transcript: &str) -> String {
    if transcript.is_empty() {
        ANALYSIS_PROMPT.to_string()
    } else {
        format!(
            "{}\n\nWords recently spoken by the streamer, as context:\n{}",
            ANALYSIS_PROMPT, transcript
        )
    }
}

fn truncate(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() > 120 {
        let cut: String = trimmed.chars().take(120).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}
