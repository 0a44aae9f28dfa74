//! Configuration schema.
//!
//! Every field has a serde default so `{}` is a valid config; the loader
//! validates ranges after parsing.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,

    /// Database file location. `None` means `~/.easel/data/easel.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            generation: GenerationConfig::default(),
            provider: ProviderConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Queue limits. Both gates are fixed at process start; the queue takes a
/// copy of this struct and never re-reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of provider calls logically in flight.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Provider calls admitted per minute. Successive calls are spaced by
    /// at least `60000 / rate_limit_per_minute` milliseconds.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u64,

    /// Provider attempts per job before falling back to a placeholder.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Simulated latency before a placeholder result resolves.
    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,
}

impl GenerationConfig {
    /// Minimum wall-clock spacing between successive provider calls.
    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(60_000 / self.rate_limit_per_minute.max(1))
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            max_attempts: default_max_attempts(),
            fallback_delay_ms: default_fallback_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Name of the environment variable holding the API key. A missing key
    /// is a provider error at call time, which the queue turns into a
    /// placeholder result.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_image_size")]
    pub image_size: String,

    /// Bounded wait for the provider response. This is the only timeout in
    /// the pipeline; jobs themselves are never cancelled.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            image_size: default_image_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Broadcast channel capacity. Slow subscribers past this lag drop
    /// events rather than block the pipeline.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_rate_limit_per_minute() -> u64 {
    12
}

fn default_max_attempts() -> u32 {
    3
}

fn default_fallback_delay_ms() -> u64 {
    750
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/images/generations".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    100
}
