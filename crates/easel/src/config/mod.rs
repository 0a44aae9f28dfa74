pub mod schema;

use std::path::Path;

use crate::error::ConfigError;

pub use schema::{Config, GenerationConfig, NotificationConfig, ProviderConfig};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let gen = &config.generation;
    if gen.max_concurrent_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "generation.max_concurrent_jobs must be greater than 0".to_string(),
        });
    }
    if gen.rate_limit_per_minute == 0 || gen.rate_limit_per_minute > 60_000 {
        return Err(ConfigError::Validation {
            message: format!(
                "generation.rate_limit_per_minute must be in 1..=60000, got {}",
                gen.rate_limit_per_minute
            ),
        });
    }
    if gen.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "generation.max_attempts must be at least 1".to_string(),
        });
    }

    if config.provider.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "provider.timeout_secs must be greater than 0".to_string(),
        });
    }
    if config.provider.api_url.is_empty() {
        return Err(ConfigError::Validation {
            message: "provider.api_url must not be empty".to_string(),
        });
    }

    if config.notifications.channel_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "notifications.channel_capacity must be greater than 0".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_valid() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.generation.max_concurrent_jobs, 3);
        assert_eq!(config.generation.rate_limit_per_minute, 12);
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.provider.model, "dall-e-3");
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/tmp/easel-test.db",
            "generation": {
                "max_concurrent_jobs": 5,
                "rate_limit_per_minute": 30,
                "max_attempts": 2,
                "fallback_delay_ms": 100
            },
            "provider": {
                "api_url": "http://localhost:9090/v1/images/generations",
                "api_key_env": "TEST_KEY",
                "model": "test-model",
                "image_size": "512x512",
                "timeout_secs": 5
            },
            "notifications": { "channel_capacity": 16 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.generation.max_concurrent_jobs, 5);
        assert_eq!(config.generation.rate_limit_per_minute, 30);
        assert_eq!(config.provider.api_key_env, "TEST_KEY");
        assert_eq!(config.notifications.channel_capacity, 16);
    }

    #[test]
    fn test_min_call_interval() {
        let mut gen = GenerationConfig::default();
        gen.rate_limit_per_minute = 12;
        assert_eq!(gen.min_call_interval().as_millis(), 5000);

        gen.rate_limit_per_minute = 60;
        assert_eq!(gen.min_call_interval().as_millis(), 1000);
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result =
            load_config_from_str(r#"{ "generation": { "max_concurrent_jobs": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let result =
            load_config_from_str(r#"{ "generation": { "rate_limit_per_minute": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = load_config_from_str(r#"{ "generation": { "max_attempts": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = load_config_from_str("{ not json");
        assert!(result.is_err());
    }
}
