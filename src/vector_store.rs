//! # VectorStore
//!
//! Persistent embedding database behind the chatbot's retrieval step.
//!
//! The store owns three things and keeps them in lock-step:
//! - an [`Embedder`] that turns text into vectors,
//! - a [`VectorIndex`] holding the embedding matrix,
//! - a [`DocumentStore`] holding the chunk texts.
//!
//! Row `i` of the index always belongs to document `i`, and the two lengths are
//! equal before and after every public call, including failed ones.
//!
//! ## Responsibilities
//! - **Add**: embed a batch of chunks, then append vectors and texts together.
//! - **Search**: embed the query, rank rows by cosine similarity, resolve texts.
//! - **Persistence**: write/read a [`Snapshot`] holding texts, the raw matrix and
//!   the embedder identity. A missing snapshot simply means "nothing stored yet".
//!
//! ## Quick Example
//! ```no_run
//! use climate_rag::embedder::HashingEmbedder;
//! use climate_rag::index::IndexBackend;
//! use climate_rag::vector_store::VectorStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut vs = VectorStore::new(Box::new(HashingEmbedder::new(384)?), IndexBackend::Flat);
//! vs.add_documents(vec!["熱島效應是指城市溫度高於周邊地區".to_string()])?;
//! for hit in vs.search("城市溫度", 3)? {
//!     println!("{:.3} {}", hit.score, hit.content);
//! }
//! vs.save("vectorstore.bin")?;
//! # Ok(()) }
//! ```

use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document_store::DocumentStore;
use crate::embedder::{Embedder, EmbedderConfig, embedder_from_config};
use crate::error::{RagError, Result};
use crate::index::{IndexBackend, VectorIndex};
use crate::snapshot::Snapshot;

/// One ranked hit: the chunk text and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub content: String,
    pub score: f32,
}

/// What [`VectorStore::load`] found at the snapshot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file; the store was left as it was.
    Missing,
    /// The store now holds exactly the snapshot's documents.
    Loaded { documents: usize },
}

pub struct VectorStore {
    embedder: Box<dyn Embedder>,
    index: VectorIndex,
    documents: DocumentStore,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("embedder", &self.embedder.config())
            .field("index", &self.index)
            .field("documents", &self.documents.len())
            .finish()
    }
}

impl VectorStore {
    /// Create an empty store. The index dimension is taken from the embedder.
    pub fn new(embedder: Box<dyn Embedder>, backend: IndexBackend) -> Self {
        let dimension = embedder.config().dimension;
        Self {
            embedder,
            index: VectorIndex::with_dimension(backend, dimension),
            documents: DocumentStore::new(),
        }
    }

    /// Create a store and load the snapshot at `path` if there is one.
    pub fn open(
        path: impl AsRef<Path>,
        embedder: Box<dyn Embedder>,
        backend: IndexBackend,
    ) -> Result<Self> {
        let mut store = Self::new(embedder, backend);
        store.load(path)?;
        Ok(store)
    }

    fn assert_aligned(&self) {
        debug_assert_eq!(
            self.index.rows(),
            self.documents.len(),
            "index rows and documents diverged"
        );
    }

    /// Embed `chunks` and append them. Returns how many were added.
    ///
    /// # Errors
    /// - [`RagError::ModelUnavailable`] if embedding fails or returns the wrong
    ///   number of vectors.
    /// - [`RagError::DimensionMismatch`] if a vector has the wrong length.
    ///
    /// On error nothing has been added.
    pub fn add_documents(&mut self, chunks: Vec<String>) -> Result<usize> {
        self.assert_aligned();
        if chunks.is_empty() {
            return Ok(0);
        }

        info!("Adding {} chunks to store", chunks.len());
        let vectors = self.embedder.embed(&chunks)?;
        if vectors.len() != chunks.len() {
            return Err(RagError::ModelUnavailable(format!(
                "embedder returned {} vectors for {} inputs",
                vectors.len(),
                chunks.len()
            )));
        }

        self.index.add(&vectors)?;
        let added = chunks.len();
        self.documents.append(chunks);

        self.assert_aligned();
        info!("Successfully added chunks. Total: {}", self.documents.len());
        Ok(added)
    }

    /// Up to `k` chunks most similar to `query`, best first.
    ///
    /// An empty store answers immediately without touching the embedder.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.assert_aligned();
        if k == 0 || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Searching for: '{}' (limit: {})", query, k);
        let mut vectors = self.embedder.embed(&[query.to_string()])?;
        if vectors.len() != 1 {
            return Err(RagError::ModelUnavailable(format!(
                "embedder returned {} vectors for 1 input",
                vectors.len()
            )));
        }
        let query_vector = vectors.remove(0);

        let results = self
            .index
            .search(&query_vector, k)?
            .into_iter()
            .map(|(row, score)| {
                Ok(SearchResult {
                    content: self.documents.get(row)?.to_string(),
                    score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Found {} results", results.len());
        Ok(results)
    }

    /// Persist texts, raw matrix and embedder identity to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.assert_aligned();
        let path = path.as_ref();
        info!("Saving VectorStore to {:?}", path);

        let config = self.embedder.config();
        let cols = self.index.dimension().unwrap_or(config.dimension);
        let snapshot = Snapshot::new(
            config,
            self.documents.iter().map(str::to_string).collect(),
            cols,
            self.index.raw_matrix().to_vec(),
        );
        snapshot.write(path)?;

        info!("VectorStore saved: {} documents", self.documents.len());
        Ok(())
    }

    /// Replace the store's contents with the snapshot at `path`.
    ///
    /// If the snapshot was produced by a different embedder than the active one, that
    /// embedder is re-instantiated from its stored identifier.
    ///
    /// # Errors
    /// - [`RagError::CorruptSnapshot`] for undecodable or inconsistent files.
    /// - [`RagError::ModelUnavailable`] if the stored embedder cannot be rebuilt.
    ///
    /// On error the store keeps its previous contents.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<LoadOutcome> {
        self.load_with(path, embedder_from_config)
    }

    /// [`load`](Self::load) with a caller-supplied way to build the stored embedder.
    pub fn load_with<F>(&mut self, path: impl AsRef<Path>, make_embedder: F) -> Result<LoadOutcome>
    where
        F: FnOnce(&EmbedderConfig) -> Result<Box<dyn Embedder>>,
    {
        self.assert_aligned();
        let path = path.as_ref();
        info!("Loading VectorStore from {:?}", path);

        let snapshot = match Snapshot::read(path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No snapshot at {:?}; keeping current store", path);
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => {
                warn!("Failed to load snapshot {:?}: {}", path, e);
                return Err(e);
            }
        };

        let replacement = if snapshot.embedder == self.embedder.config() {
            None
        } else {
            info!(
                "Snapshot was built with {}; re-instantiating embedder",
                snapshot.embedder.model_id
            );
            let embedder = make_embedder(&snapshot.embedder)?;
            if embedder.config() != snapshot.embedder {
                return Err(RagError::ModelUnavailable(format!(
                    "embedder {} does not reproduce snapshot configuration {:?}",
                    embedder.config().model_id,
                    snapshot.embedder
                )));
            }
            Some(embedder)
        };

        let dimension = if snapshot.rows == 0 {
            snapshot.embedder.dimension
        } else {
            snapshot.cols as usize
        };
        let index = VectorIndex::from_raw(self.index.backend(), dimension, snapshot.matrix)
            .map_err(|e| RagError::CorruptSnapshot(e.to_string()))?;
        let documents = DocumentStore::from_chunks(snapshot.documents);
        if index.rows() != documents.len() {
            return Err(RagError::CorruptSnapshot(format!(
                "{} documents but {} matrix rows",
                documents.len(),
                index.rows()
            )));
        }

        if let Some(embedder) = replacement {
            self.embedder = embedder;
        }
        self.index = index;
        self.documents = documents;

        self.assert_aligned();
        info!("Loaded {} chunks", self.documents.len());
        Ok(LoadOutcome::Loaded {
            documents: self.documents.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn embedder_config(&self) -> EmbedderConfig {
        self.embedder.config()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }
}

/// Handle to a store shared between request handlers.
///
/// `add_documents` and `load` take the write lock; `search` and `save` share the
/// read lock, so readers never observe a half-applied add or load.
#[derive(Debug, Clone)]
pub struct SharedVectorStore {
    inner: Arc<RwLock<VectorStore>>,
}

impl SharedVectorStore {
    pub fn new(store: VectorStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub async fn add_documents(&self, chunks: Vec<String>) -> Result<usize> {
        self.inner.write().await.add_documents(chunks)
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.inner.read().await.search(query, k)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.read().await.save(path)
    }

    pub async fn load(&self, path: impl AsRef<Path>) -> Result<LoadOutcome> {
        self.inner.write().await.load(path)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
