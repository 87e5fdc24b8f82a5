use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

pub const SAMPLE_CONFIG: &str = include_str!("../config.sample.yaml");
pub const SAMPLE_PERSONAS: &str = include_str!("../personas.sample.yaml");

/// The whole runtime configuration as one object. Every field has a
/// default; nothing in the pipeline reads configuration from anywhere else.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: EnvironmentConfig,
    pub behavior: BehaviorConfig,
    pub models: ModelsConfig,
    pub performance: PerformanceConfig,
    pub personas: PersonasConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub ollama_url: String,
    pub voice_server_url: Option<String>,
    pub xml_file: PathBuf,
    /// Argv of the external helper that writes a PNG of the active window
    /// to stdout.
    pub capture_command: Vec<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            voice_server_url: None,
            xml_file: PathBuf::from("comment.xml"),
            capture_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub enable_voice: bool,
    pub debug_mode: bool,
    /// Seconds between observation cycles.
    pub analysis_interval: f64,
    /// Minimum seconds between released comments.
    pub comment_gap: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            enable_voice: true,
            debug_mode: false,
            analysis_interval: 5.0,
            comment_gap: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub image_analysis_model: String,
    pub comment_generation_model: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            image_analysis_model: "gemma3:12b".to_string(),
            comment_generation_model: "gemma3:12b".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Maximum concurrent persona generations.
    pub max_in_flight: usize,
    /// Timeout, in seconds, applied to every external call.
    pub request_timeout: f64,
    /// How long an in-flight cycle may keep running after shutdown is
    /// requested.
    pub shutdown_grace: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 3,
            request_timeout: 60.0,
            shutdown_grace: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PersonasConfig {
    pub personas_file: PathBuf,
    pub select_count: usize,
    pub always_include: Vec<String>,
}

impl Default for PersonasConfig {
    fn default() -> Self {
        Self {
            personas_file: PathBuf::from("personas.yaml"),
            select_count: 5,
            always_include: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Optional synthesis prompt template override.
    pub prompt_file: Option<PathBuf>,
}

impl AppConfig {
    /// Loads the config file. A missing file yields defaults with a
    /// warning; a malformed one is a startup error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.behavior.analysis_interval.max(0.1))
    }

    pub fn comment_gap(&self) -> Duration {
        Duration::from_secs_f64(self.behavior.comment_gap.max(0.0))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.performance.request_timeout.max(1.0))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs_f64(self.performance.shutdown_grace.max(0.0))
    }
}

/// Command-line overrides for the handful of fields people flip per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub ollama_url: Option<String>,
    pub voice_server_url: Option<String>,
    pub xml_file: Option<PathBuf>,
    pub interval: Option<f64>,
    pub no_voice: bool,
    pub debug: bool,
}

impl CliOverrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.ollama_url {
            config.environment.ollama_url = url.clone();
        }
        if let Some(url) = &self.voice_server_url {
            config.environment.voice_server_url = Some(url.clone());
        }
        if let Some(path) = &self.xml_file {
            config.environment.xml_file = path.clone();
        }
        if let Some(interval) = self.interval {
            config.behavior.analysis_interval = interval;
        }
        if self.no_voice {
            config.behavior.enable_voice = false;
        }
        if self.debug {
            config.behavior.debug_mode = true;
        }
    }
}

/// Writes a sample file unless the target already exists. Returns whether
/// anything was written.
pub fn write_sample(path: &Path, contents: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, contents)
        .with_context(|| format!("writing sample file {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.environment.ollama_url, "http://localhost:11434");
        assert_eq!(config.environment.xml_file, PathBuf::from("comment.xml"));
        assert!(config.behavior.enable_voice);
        assert_eq!(config.personas.select_count, 5);
        assert_eq!(config.performance.max_in_flight, 3);
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert_eq!(config.comment_gap(), Duration::from_secs(2));
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_sections() {
        let config: AppConfig = serde_yaml::from_str(
            r#"
behavior:
  analysis_interval: 12.5
personas:
  select_count: 3
  always_include: ["listener", "safety"]
"#,
        )
        .unwrap();
        assert_eq!(config.behavior.analysis_interval, 12.5);
        assert!(config.behavior.enable_voice);
        assert_eq!(config.personas.select_count, 3);
        assert_eq!(
            config.personas.always_include,
            vec!["listener".to_string(), "safety".to_string()]
        );
        assert_eq!(config.models.image_analysis_model, "gemma3:12b");
    }

    #[test]
    fn sample_config_parses_cleanly() {
        let config: AppConfig = serde_yaml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.environment.capture_command, vec!["grim", "-"]);
        assert_eq!(config.personas.personas_file, PathBuf::from("personas.yaml"));
    }

    #[test]
    fn overrides_replace_only_the_named_fields() {
        let mut config = AppConfig::default();
        let overrides = CliOverrides {
            ollama_url: Some("http://gpu-box:11434".to_string()),
            interval: Some(30.0),
            no_voice: true,
            debug: true,
            ..Default::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.environment.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.behavior.analysis_interval, 30.0);
        assert!(!config.behavior.enable_voice);
        assert!(config.behavior.debug_mode);
        assert_eq!(config.environment.xml_file, PathBuf::from("comment.xml"));
    }

    #[test]
    fn empty_overrides_change_nothing() {
        let mut config = AppConfig::default();
        CliOverrides::default().apply(&mut config);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn negative_durations_are_clamped() {
        let mut config = AppConfig::default();
        config.behavior.analysis_interval = -3.0;
        config.behavior.comment_gap = -1.0;
        assert_eq!(config.interval(), Duration::from_secs_f64(0.1));
        assert_eq!(config.comment_gap(), Duration::ZERO);
    }

    #[test]
    fn write_sample_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(write_sample(&path, SAMPLE_CONFIG).unwrap());
        assert!(!write_sample(&path, "something else").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CONFIG);
    }
}
