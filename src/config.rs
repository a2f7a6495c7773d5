//! Pipeline configuration loaded from `~/.config/versereel/config.toml`.
//!
//! Every section has defaults, so a missing or empty file is valid. Secrets
//! never live in the file: it names the environment variable holding them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSection,
    pub captions: CaptionSection,
    pub text: TextSection,
    pub speech: SpeechSection,
    pub stock: StockSection,
    pub storage: StorageSection,
    pub media: MediaSection,
    pub retention: RetentionSection,
}

/// Orchestrator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Directory under which per-job work areas are created
    pub work_root: PathBuf,
    /// Upper bound on concurrently running jobs (unbounded when absent)
    pub max_concurrent_jobs: Option<usize>,
    /// How often the scheduler looks for due jobs
    pub schedule_interval_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("versereel"),
            max_concurrent_jobs: None,
            schedule_interval_secs: 60,
        }
    }
}

impl PipelineSection {
    #[must_use]
    pub fn schedule_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.schedule_interval_secs.max(1))
    }
}

/// Caption engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionSection {
    pub max_words_per_chunk: usize,
    /// Frame rate of gradient overlay rasters
    pub overlay_fps: u32,
    pub overlay_width: u32,
    pub overlay_height: u32,
}

impl Default for CaptionSection {
    fn default() -> Self {
        Self {
            max_words_per_chunk: 6,
            overlay_fps: 10,
            overlay_width: 360,
            overlay_height: 96,
        }
    }
}

/// Text-generation service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TextSection {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key_env: String,
}

impl Default for TextSection {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Speech synthesis service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechSection {
    pub api_base: String,
    pub model: String,
    pub voice: String,
    pub speed: f32,
    /// Audio container, also the narration file extension
    pub format: String,
    pub api_key_env: String,
}

impl Default for SpeechSection {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "tts-1-hd".to_string(),
            voice: "nova".to_string(),
            speed: 0.95,
            format: "mp3".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Stock-media search service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StockSection {
    pub api_base: String,
    pub per_page: u32,
    pub api_key_env: String,
}

impl Default for StockSection {
    fn default() -> Self {
        Self {
            api_base: "https://api.pexels.com".to_string(),
            per_page: 15,
            api_key_env: "PEXELS_API_KEY".to_string(),
        }
    }
}

/// Object storage backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSection {
    /// Files copied under a local directory, addressed with `file://` URLs
    Local { directory: PathBuf },
    /// HTTP PUT to `endpoint/key`, served from `public_base/key`
    Http {
        endpoint: String,
        public_base: String,
        #[serde(default)]
        token_env: Option<String>,
    },
}

impl Default for StorageSection {
    fn default() -> Self {
        Self::Local {
            directory: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("versereel")
                .join("objects"),
        }
    }
}

/// Muxing engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaSection {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub frame_rate: u32,
    pub video_codec: String,
    pub audio_codec: String,
    /// x264 constant rate factor
    pub crf: u8,
    pub preset: String,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            ffmpeg_path: find_binary("ffmpeg"),
            ffprobe_path: find_binary("ffprobe"),
            frame_rate: 25,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            crf: 23,
            preset: "medium".to_string(),
        }
    }
}

/// Retention policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    pub max_age_days: u32,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self { max_age_days: 30 }
    }
}

fn find_binary(name: &str) -> String {
    which::which(name)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| name.to_string())
}

impl Config {
    /// Load from `~/.config/versereel/config.toml`.
    ///
    /// Returns defaults if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_path(&path)
    }

    /// Load from an explicit path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Parse configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid configuration TOML")
    }
}

/// Resolve a secret named by an `*_env` setting
pub fn secret_from_env(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| format!("environment variable {var} is not set"))
}

/// Return the path to the config file.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("versereel")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.captions.max_words_per_chunk, 6);
        assert_eq!(config.speech.voice, "nova");
        assert_eq!(config.stock.per_page, 15);
        assert_eq!(config.retention.max_age_days, 30);
        assert!(config.pipeline.max_concurrent_jobs.is_none());
        assert_eq!(config.pipeline.schedule_interval().as_secs(), 60);
        assert!(matches!(config.storage, StorageSection::Local { .. }));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
[speech]
voice = "onyx"

[pipeline]
max_concurrent_jobs = 2
"#,
        )
        .unwrap();
        assert_eq!(config.speech.voice, "onyx");
        assert_eq!(config.speech.model, "tts-1-hd");
        assert_eq!(config.pipeline.max_concurrent_jobs, Some(2));
    }

    #[test]
    fn http_storage_section() {
        let config = Config::from_toml_str(
            r#"
[storage]
kind = "http"
endpoint = "https://upload.example.com/bucket"
public_base = "https://cdn.example.com"
token_env = "STORAGE_TOKEN"
"#,
        )
        .unwrap();
        match config.storage {
            StorageSection::Http {
                endpoint,
                public_base,
                token_env,
            } => {
                assert_eq!(endpoint, "https://upload.example.com/bucket");
                assert_eq!(public_base, "https://cdn.example.com");
                assert_eq!(token_env.as_deref(), Some("STORAGE_TOKEN"));
            }
            StorageSection::Local { .. } => panic!("expected http storage"),
        }
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Config::from_toml_str("[captions\nmax = ").is_err());
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(secret_from_env("VERSEREEL_TEST_SURELY_UNSET_VAR").is_err());
    }
}
