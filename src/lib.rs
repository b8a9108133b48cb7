//! # climate_rag (library root)
//!
//! Retrieval-augmented chat over a persistent embedding store, plus the `crag` CLI.
//!
//! - Embedding backends (`embedder`): a BERT sentence embedder fetched from the
//!   Hugging Face hub, and a deterministic hashing embedder for offline use.
//! - Exact cosine search (`index`) and the chunk texts it ranks (`document_store`).
//! - The persistent store tying them together (`vector_store`, `snapshot`).
//! - Chunking (`chunker`), context assembly (`retrieval`), prompt templates
//!   (`template`), text generation (`generator`), chat sessions (`history`, `rag`).
//! - Configuration (`config`) and CLI parsing (`commands`).
//!
//! ## Files
//! Everything lives under the per-platform configuration directory ([`config_dir`]):
//!
//! - macOS: `~/Library/Application Support/com.climate-rag.crag/`
//! - Linux (XDG): `~/.config/crag/`
//! - Windows: `C:\Users\<you>\AppData\Roaming\climate-rag\crag\config\`
//!
//! ```text
//! config.yaml
//! templates/heat_island_expert.yaml
//! vector_store.bin
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod chunker;
pub mod commands;
pub mod config;
pub mod document_store;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod history;
pub mod index;
pub mod rag;
pub mod retrieval;
pub mod snapshot;
pub mod template;
pub mod vector_store;

pub use error::{RagError, Result};
pub use rag::{ChatReply, RagChat};
pub use vector_store::{LoadOutcome, SearchResult, SharedVectorStore, VectorStore};

/// Return the per-platform configuration directory.
///
/// The directory is **not** created by this function.
///
/// # Errors
/// [`RagError::Config`] if the platform has no home directory to derive it from.
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "climate-rag", "crag")
        .ok_or_else(|| RagError::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
