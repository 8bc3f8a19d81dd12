use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod assistant;
pub mod citations;
pub mod fetch;
pub mod model;
pub mod openai;
pub mod poll;
pub mod run;
pub mod service;
pub mod staging;
pub mod store;
pub mod workflow;

// Re-export for convenience
pub use citations::{Citation, Marked};
pub use fetch::{Document, Fetcher, HttpFetcher};
pub use model::{RunStatus, Usage};
pub use openai::OpenAiClient;
pub use poll::PollPolicy;
pub use service::HostedService;
pub use workflow::{QuickReply, Summarizer, Summary};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to retrieve {url}: HTTP {status}")]
    Retrieval { url: String, status: u16 },
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("staging error for {}: {source}", .path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create vector store: {0}")]
    IndexCreation(String),
    #[error("failed to delete vector store: {0}")]
    IndexDeletion(String),
    #[error("failed to upload file to vector store (status {status}): {reason}")]
    Upload { status: String, reason: String },
    #[error("assistant lifecycle error: {0}")]
    AssistantLifecycle(String),
    #[error("failed to cancel run {0}")]
    RunCancellation(String),
    #[error("run ended with status {status}: {reason}")]
    RunNotCompleted { status: RunStatus, reason: String },
    #[error("timed out after {:.1}s waiting for {what}", .elapsed.as_secs_f64())]
    Timeout { what: String, elapsed: Duration },
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
    #[error("service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },
    #[error("failed to decode service response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Progress events emitted while a summary is being produced.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Fetched {
        url: String,
        bytes: usize,
    },
    Staged {
        path: PathBuf,
    },
    IndexCreated {
        store_id: String,
    },
    Uploading {
        filename: String,
    },
    Uploaded {
        file_id: String,
        elapsed: Duration,
    },
    AssistantReady {
        assistant_id: String,
    },
    RunStarted {
        run_id: String,
        thread_id: String,
    },
    RunFinished {
        status: RunStatus,
        elapsed: Duration,
    },
    Warning {
        message: String,
    },
    CleanedUp {
        released: usize,
    },
}

/// Configuration for one summarization invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub assistant_name: String,
    pub instructions: String,
    pub store_name: String,
    /// Days of inactivity after which the service expires the vector store.
    pub store_expiry_days: u32,
    pub scratch_dir: PathBuf,
    pub poll: PollPolicy,
    pub request_timeout_secs: u64,
    /// Token cap for quick (chat completion) mode.
    pub quick_max_tokens: u32,
}

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant and have plenty of knowledge about informatics.";

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            assistant_name: "paperdigest".to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            store_name: "paperdigest_storage".to_string(),
            store_expiry_days: 1,
            scratch_dir: PathBuf::from("pdfs"),
            poll: PollPolicy::default(),
            request_timeout_secs: 120,
            quick_max_tokens: 100,
        }
    }
}

impl Config {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// `OPENAI_API_KEY` is required; everything else is optional.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_env_with_key(None)
    }

    /// Like [`from_env`](Config::from_env), but an explicit key wins over `OPENAI_API_KEY`.
    pub fn from_env_with_key(api_key: Option<String>) -> Result<Self, CoreError> {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CoreError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let mut config = Config {
            api_key,
            ..Config::default()
        };
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("PAPERDIGEST_MODEL") {
            config.model = model;
        }
        if let Ok(dir) = std::env::var("PAPERDIGEST_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(secs) = std::env::var("POLL_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.poll.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.api_key.trim().is_empty() {
            return Err(CoreError::Config("API key is empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(CoreError::Config(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.store_expiry_days == 0 {
            return Err(CoreError::Config(
                "store expiry must be at least one day".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_service_defaults() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.store_expiry_days, 1);
        assert_eq!(config.scratch_dir, PathBuf::from("pdfs"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn validate_rejects_empty_key() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn validate_rejects_non_http_base_url() {
        let config = Config {
            api_key: "sk-test".into(),
            base_url: "ftp://example.com".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            api_key: "sk-test".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_key_is_used() {
        let config = Config::from_env_with_key(Some("sk-explicit".into())).unwrap();
        assert_eq!(config.api_key, "sk-explicit");
    }

    #[test]
    fn timeout_error_reports_seconds() {
        let err = CoreError::Timeout {
            what: "run run_1".into(),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "timed out after 1.5s waiting for run run_1");
    }
}
