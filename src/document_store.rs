//! Append-only list of chunks; position `i` pairs with row `i` of the index.

use crate::error::{RagError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStore {
    chunks: Vec<String>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: Vec<String>) -> Self {
        Self { chunks }
    }

    pub fn append(&mut self, chunks: impl IntoIterator<Item = String>) {
        self.chunks.extend(chunks);
    }

    /// # Errors
    /// [`RagError::IndexOutOfRange`] past the end of the store.
    pub fn get(&self, index: usize) -> Result<&str> {
        self.chunks
            .get(index)
            .map(String::as_str)
            .ok_or(RagError::IndexOutOfRange {
                index,
                len: self.chunks.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(String::as_str)
    }
}
