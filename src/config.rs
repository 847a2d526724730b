use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not found. Make sure it's set in your .env file.")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("CHUNK_OVERLAP ({overlap}) must be smaller than CHUNK_SIZE ({chunk_size})")]
    Overlap { chunk_size: usize, overlap: usize },
}

/// Settings for the Gemini API used for both embeddings and answers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub upload_dir: PathBuf,
    pub vector_store_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    pub max_upload_bytes: usize,
    pub max_concurrent_requests: usize,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("GOOGLE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("GOOGLE_API_KEY"))?;

        let api_url = env::var("GEMINI_API_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let chat_model = env::var("GEMINI_CHAT_MODEL").unwrap_or_else(|_| "gemini-2.5-pro".to_string());
        let embedding_model =
            env::var("GEMINI_EMBEDDING_MODEL").unwrap_or_else(|_| "models/embedding-001".to_string());

        Ok(Self {
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            chat_model,
            embedding_model,
            temperature: parse_var("GEMINI_TEMPERATURE", 0.2)?,
            timeout: Duration::from_secs(parse_var("MODEL_TIMEOUT_SECS", 60)?),
        })
    }
}

impl AppConfig {
    /// Reads the whole configuration from the process environment.
    ///
    /// Call after the `.env` file has been loaded. Fails fast when the API key
    /// is absent or a numeric setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = ProviderConfig::from_env()?;

        let config = Self {
            provider,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/uploads")),
            vector_store_dir: env::var("VECTOR_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/vector_store")),
            chunk_size: parse_var("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", 200)?,
            retrieval_k: parse_var("RETRIEVAL_K", 3)?,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            max_concurrent_requests: parse_var("MAX_CONCURRENT_REQUESTS", 64)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid { name: "CHUNK_SIZE", value: "0".to_string() });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Overlap {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        if self.retrieval_k == 0 {
            return Err(ConfigError::Invalid { name: "RETRIEVAL_K", value: "0".to_string() });
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_CONCURRENT_REQUESTS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            provider: ProviderConfig {
                api_key: "key".to_string(),
                api_url: "http://localhost".to_string(),
                chat_model: "chat".to_string(),
                embedding_model: "embed".to_string(),
                temperature: 0.2,
                timeout: Duration::from_secs(1),
            },
            upload_dir: PathBuf::from("uploads"),
            vector_store_dir: PathBuf::from("store"),
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_k: 3,
            max_upload_bytes: 1024,
            max_concurrent_requests: 4,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let mut config = sample();
        config.chunk_overlap = 1000;
        assert!(matches!(config.validate(), Err(ConfigError::Overlap { .. })));
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut config = sample();
        config.retrieval_k = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "RETRIEVAL_K", .. })
        ));
    }
}
