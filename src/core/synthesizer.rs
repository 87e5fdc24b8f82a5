use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::core::analyzer::SceneDescription;
use crate::core::llm::GenerationClient;
use crate::core::personas::Persona;
use crate::error::{GenerationError, SynthesisError};

/// One short persona-flavored remark, ready for dispatch. Never empty.
#[derive(Debug, Clone)]
pub struct Comment {
    pub handle: String,
    pub text: String,
    pub produced_at: SystemTime,
}

/// Result of one persona's synthesis call. A decline is an expected outcome,
/// not a failure.
#[derive(Debug)]
pub enum SynthesisOutcome {
    Comment(Comment),
    Declined { persona: String },
    Failed(SynthesisError),
}

pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are {PERSONA_NAME} ({PERSONA_HANDLE}), a viewer commenting in a live game stream chat.
Profile: {PERSONA_DESCRIPTION}
Comment style: {PERSONA_STYLE}
Example of your voice: {PERSONA_EXAMPLE}

What is currently on screen:
{SCENE}
{VOICE_CONTEXT}
Write exactly one short chat comment, at most 20 words, reacting to one
concrete element of the scene, in your own voice. If you have nothing worth
saying, reply with the single word: none. Output only the comment text, one
line, no quotes and no preamble.";

/// Stage 2: one generation call per selected persona, fanned out with a
/// bounded number in flight.
pub struct CommentSynthesizer {
    client: Arc<dyn GenerationClient>,
    model: String,
    template: String,
    timeout: Duration,
    max_in_flight: usize,
}

impl CommentSynthesizer {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        model: impl Into<String>,
        template: Option<String>,
        timeout: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            template: template.unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string()),
            timeout,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn build_prompt(
        &self,
        persona: &Persona,
        scene: &SceneDescription,
        transcript: &str,
    ) -> String {
        let voice_section = if transcript.is_empty() {
            String::new()
        } else {
            format!(
                "\nWords recently spoken by the streamer:\n{}\n",
                transcript
            )
        };
        self.template
            .replace("{PERSONA_NAME}", &persona.name)
            .replace("{PERSONA_HANDLE}", &persona.handle)
            .replace("{PERSONA_DESCRIPTION}", &persona.description)
            .replace("{PERSONA_STYLE}", &persona.style)
            .replace("{PERSONA_EXAMPLE}", &persona.example)
            .replace("{SCENE}", &scene.description)
            .replace("{VOICE_CONTEXT}", &voice_section)
    }

    /// Runs every persona's call concurrently, at most `max_in_flight` at a
    /// time, and returns outcomes in completion order. One persona's failure
    /// never aborts the others.
    pub async fn synthesize_all(
        &self,
        scene: &SceneDescription,
        personas: &[Persona],
        transcript: &str,
    ) -> Vec<SynthesisOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut set: JoinSet<SynthesisOutcome> = JoinSet::new();

        for persona in personas {
            let prompt = self.build_prompt(persona, scene, transcript);
            let client = Arc::clone(&self.client);
            let model = self.model.clone();
            let id = persona.id.clone();
            let handle = persona.handle.clone();
            let timeout = self.timeout;
            let semaphore = Arc::clone(&semaphore);

            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return SynthesisOutcome::Failed(SynthesisError {
                            persona: id,
                            source: GenerationError::Transport(
                                "synthesis pool closed".to_string(),
                            ),
                        });
                    }
                };
                match tokio::time::timeout(timeout, client.generate(&model, &prompt, None)).await
                {
                    Err(_) => SynthesisOutcome::Failed(SynthesisError {
                        persona: id,
                        source: GenerationError::Timeout,
                    }),
                    Ok(Err(source)) => {
                        SynthesisOutcome::Failed(SynthesisError { persona: id, source })
                    }
                    Ok(Ok(raw)) => interpret_reply(&id, &handle, &raw),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(personas.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("synthesis task failed to join: {}", e),
            }
        }
        outcomes
    }
}

fn interpret_reply(persona_id: &str, handle: &str, raw: &str) -> SynthesisOutcome {
    let text = raw.trim().trim_matches('"').trim();
    let lowered = text.to_lowercase();
    if text.is_empty() || lowered == "none" || lowered == "none." {
        debug!(persona = persona_id, "persona declined to comment");
        return SynthesisOutcome::Declined {
            persona: persona_id.to_string(),
        };
    }
    // Keep only the first line; models occasionally append trailing chatter.
    let line = text.lines().next().unwrap_or(text).trim().to_string();
    SynthesisOutcome::Comment(Comment {
        handle: handle.to_string(),
        text: line,
        produced_at: SystemTime::now(),
    })
}
