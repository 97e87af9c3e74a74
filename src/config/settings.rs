use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub ai: AiConfig,
    pub autonomy: AutonomyConfig,
    pub api_timeouts: ApiTimeoutConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub features: FeatureConfig,
    pub system: SystemConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    raw: Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    pub api_endpoint: String,
    pub model: String,
    pub max_history_length: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    pub enabled: bool,
    pub boredom_threshold: f64,
    pub tick_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTimeoutConfig {
    pub joke_api: u64,
    pub activity_api: u64,
    pub meme_api: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub sweep_interval_secs: u64,
    pub joke_ttl_secs: u64,
    pub activity_ttl_secs: u64,
    pub meme_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub random_responses: bool,
    pub rng_threshold: u32,
    pub fact_assessment_chance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub channel_buffer_size: usize,
    #[serde(default)]
    pub creator_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// Built-in defaults, then `config/{CONFIG_ENV}`, then `APP__SECTION__KEY`
    /// environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let builder = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        Self::from_builder(builder)
    }

    /// Defaults overlaid with a TOML document. Handy for tests.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let raw = with_defaults(builder)?.build()?;
        let mut settings: Settings = raw.clone().try_deserialize()?;
        settings.raw = raw;
        Ok(settings)
    }

    /// Looks up a dotted key such as `ai.max_history_length`, returning
    /// `default` when the key is missing or has the wrong shape.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.raw.get(key).unwrap_or(default)
    }

    /// Key for the generative-language API. `None` disables AI replies.
    pub fn api_key() -> Option<String> {
        env::var("GEMINI_API_KEY").ok().filter(|key| !key.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ai.request_timeout_secs)
    }

    pub fn is_creator(&self, user_id: u64) -> bool {
        self.system.creator_id == Some(user_id)
    }
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default(
            "ai.api_endpoint",
            "https://generativelanguage.googleapis.com/v1beta/models",
        )?
        .set_default("ai.enabled", true)?
        .set_default("ai.model", "gemini-1.5-flash")?
        .set_default("ai.max_history_length", 8_i64)?
        .set_default("ai.temperature", 0.9_f64)?
        .set_default("ai.max_output_tokens", 2048_i64)?
        .set_default("ai.request_timeout_secs", 30_i64)?
        .set_default("autonomy.enabled", false)?
        .set_default("autonomy.boredom_threshold", 15.0_f64)?
        .set_default("autonomy.tick_interval_secs", 60_i64)?
        .set_default("api_timeouts.joke_api", 10_i64)?
        .set_default("api_timeouts.activity_api", 10_i64)?
        .set_default("api_timeouts.meme_api", 10_i64)?
        .set_default("cache.sweep_interval_secs", 300_i64)?
        .set_default("cache.joke_ttl_secs", 3600_i64)?
        .set_default("cache.activity_ttl_secs", 300_i64)?
        .set_default("cache.meme_ttl_secs", 300_i64)?
        .set_default("storage.database_path", "data/bot_memory.db")?
        .set_default("features.random_responses", true)?
        .set_default("features.rng_threshold", 20_i64)?
        .set_default("features.fact_assessment_chance", 25_i64)?
        .set_default("system.channel_buffer_size", 100_i64)?
        .set_default("logging.level", "info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_any_file() {
        let settings = Settings::from_toml_str("").unwrap();

        assert!(settings.ai.enabled);
        assert!(!settings.autonomy.enabled);
        assert_eq!(settings.features.fact_assessment_chance, 25);
        assert_eq!(settings.ai.max_history_length, 8);
        assert_eq!(settings.ai.model, "gemini-1.5-flash");
        assert_eq!(settings.autonomy.boredom_threshold, 15.0);
        assert_eq!(settings.cache.sweep_interval_secs, 300);
        assert!(settings.system.creator_id.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [ai]
            max_history_length = 4

            [system]
            creator_id = 42
            "#,
        )
        .unwrap();

        assert_eq!(settings.ai.max_history_length, 4);
        assert!(settings.is_creator(42));
        assert!(!settings.is_creator(7));
    }

    #[test]
    fn test_dotted_lookup_with_default() {
        let settings = Settings::from_toml_str("[features]\nrandom_responses = false").unwrap();

        assert!(!settings.get_or("features.random_responses", true));
        assert_eq!(settings.get_or("api_timeouts.joke_api", 99_u64), 10);
        assert_eq!(settings.get_or("nope.missing", 5_u32), 5);
    }
}
