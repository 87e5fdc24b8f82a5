use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PersonaError;

/// A commentary voice. Behavior differs only by these text fields; every
/// persona flows through the same synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub handle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub example: String,
}

#[derive(Deserialize)]
struct PersonaFile {
    #[serde(default)]
    personas: serde_yaml::Mapping,
}

/// Immutable catalogue of persona definitions, kept in file order.
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// Loads the registry from a YAML file. A missing file yields the
    /// built-in default cast; a malformed file is an error.
    pub fn from_file(path: &Path) -> Result<Self, PersonaError> {
        if !path.exists() {
            warn!(path = %path.display(), "persona file not found, using built-in personas");
            return Ok(Self::builtin_defaults());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| PersonaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_yaml(&raw).map_err(|reason| PersonaError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        info!(count = registry.len(), path = %path.display(), "personas loaded");
        Ok(registry)
    }

    pub(crate) fn from_yaml(raw: &str) -> Result<Self, String> {
        let file: PersonaFile = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
        let mut personas = Vec::with_capacity(file.personas.len());
        for (key, value) in file.personas {
            let id = key
                .as_str()
                .ok_or_else(|| "persona ids must be strings".to_string())?
                .to_string();
            let mut persona: Persona =
                serde_yaml::from_value(value).map_err(|e| format!("persona '{}': {}", id, e))?;
            persona.id = id;
            personas.push(persona);
        }
        Ok(Self { personas })
    }

    pub fn builtin_defaults() -> Self {
        let defaults = [
            (
                "listener",
                "Listener",
                "listener_bot",
                "An ordinary viewer reacting to whatever is on screen.",
                "Short, punchy reactions.",
                "that HP bar is nearly empty!",
            ),
            (
                "safety",
                "Safety Watcher",
                "safety_bot",
                "Obsessed with hazards: ledges, lava, dwindling resources.",
                "Terse warnings.",
                "watch the drop on the right",
            ),
            (
                "expert",
                "Game Expert",
                "expert_bot",
                "Knows the mechanics inside out.",
                "Analytic play-by-play.",
                "a jump-cancel would be faster there",
            ),
            (
                "fan1",
                "Fan One",
                "fan_one",
                "Easygoing joker who has watched every stream.",
                "Casual and friendly.",
                "nice jump lol",
            ),
            (
                "fan2",
                "Fan Two",
                "fan_two",
                "Earnest and calm, quick to notice improvement.",
                "Polite observations.",
                "your routing has really improved",
            ),
        ];
        let personas = defaults
            .into_iter()
            .map(|(id, name, handle, description, style, example)| Persona {
                id: id.to_string(),
                name: name.to_string(),
                handle: handle.to_string(),
                description: description.to_string(),
                style: style.to_string(),
                example: example.to_string(),
            })
            .collect();
        Self { personas }
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Startup check for configured fixed ids; unknown ids are fatal.
    pub fn validate_ids(&self, ids: &[String]) -> Result<(), PersonaError> {
        for id in ids {
            if self.get(id).is_none() {
                return Err(PersonaError::Unknown(id.clone()));
            }
        }
        Ok(())
    }

    /// Picks this cycle's cast: all of `always_include` (deduplicated, errors
    /// on unknown ids) plus a random fill without replacement up to
    /// `select_count`. If `always_include` is longer than `select_count` the
    /// selection grows to fit it; if the registry is too small the selection
    /// saturates at every remaining persona.
    pub fn select(
        &self,
        select_count: usize,
        always_include: &[String],
        rng: &mut impl Rng,
    ) -> Result<Vec<Persona>, PersonaError> {
        let mut selection: Vec<Persona> = Vec::new();
        for id in always_include {
            let persona = self
                .get(id)
                .ok_or_else(|| PersonaError::Unknown(id.clone()))?;
            if !selection.iter().any(|p| p.id == persona.id) {
                selection.push(persona.clone());
            }
        }

        let remaining: Vec<&Persona> = self
            .personas
            .iter()
            .filter(|p| !selection.iter().any(|s| s.id == p.id))
            .collect();
        let wanted = select_count.saturating_sub(selection.len());
        if wanted > remaining.len() {
            warn!(
                requested = select_count,
                available = selection.len() + remaining.len(),
                "fewer personas available than requested, saturating"
            );
        }
        for persona in remaining.choose_multiple(rng, wanted.min(remaining.len())) {
            selection.push((*persona).clone());
        }
        Ok(selection)
    }
}
