//! Loading and writing the application's YAML configuration.
//!
//! Every field has a default, so a config file only needs the keys it changes.
//!
//! ```no_run
//! use climate_rag::config::{RagConfig, load_config};
//!
//! let config: RagConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::*;

use crate::embedder::DEFAULT_EMBEDDER_ID;
use crate::error::{RagError, Result};
use crate::index::IndexBackend;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RagConfig {
    /// The API key used to authenticate requests to the generation endpoint.
    pub api_key: String,

    /// The base URL of an OpenAI-compatible API.
    pub api_base: String,

    /// The name of the model to be used for generating responses.
    pub model: String,

    pub temperature: f32,

    /// Embedder identifier, e.g. `minilm:sentence-transformers/all-MiniLM-L6-v2` or `hashing:512`.
    pub embedder: String,

    pub index_backend: IndexBackend,

    /// Snapshot location. Relative paths resolve against the config directory.
    pub vector_store_path: String,

    // Documents retrieved per question.
    pub top_k: usize,

    // Chunking, in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_chars: usize,

    pub history_max_sessions: usize,
    pub history_max_turns: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            api_key: "CHANGEME".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            embedder: DEFAULT_EMBEDDER_ID.to_string(),
            index_backend: IndexBackend::Flat,
            vector_store_path: "vector_store.bin".to_string(),
            top_k: 3,
            chunk_size: 500,
            chunk_overlap: 50,
            min_chunk_chars: 50,
            history_max_sessions: 100,
            history_max_turns: 50,
        }
    }
}

impl RagConfig {
    /// Absolute snapshot path, joining relative values onto `base`.
    pub fn store_path(&self, base: &Path) -> PathBuf {
        let path = PathBuf::from(&self.vector_store_path);
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.history_max_sessions == 0 || self.history_max_turns == 0 {
            return Err(RagError::Config(
                "history limits must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Loads and validates the configuration from a YAML file.
pub fn load_config(file: impl AsRef<Path>) -> Result<RagConfig> {
    let file = file.as_ref();
    info!("Loading config: {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: RagConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Writes `config` as YAML, creating parent directories.
pub fn write_config(config: &RagConfig, file: impl AsRef<Path>) -> Result<()> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file, serde_yaml::to_string(config)?)?;
    info!("Wrote config: {}", file.display());
    Ok(())
}
