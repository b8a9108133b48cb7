//! # Snapshot format
//!
//! The on-disk form of a [`VectorStore`](crate::vector_store::VectorStore): a single
//! `bincode` document (serde encoding, varint config) holding
//!
//! | field      | meaning                                             |
//! |------------|-----------------------------------------------------|
//! | `magic`    | `b"CRVS"`                                           |
//! | `version`  | format version, currently `1`                       |
//! | `embedder` | [`EmbedderConfig`] that produced the matrix         |
//! | `documents`| chunk texts, in row order                           |
//! | `rows`     | number of matrix rows                               |
//! | `cols`     | number of matrix columns (vector dimension)         |
//! | `matrix`   | raw embeddings, row-major, `rows * cols` floats     |
//!
//! Explicit row and column counts let [`Snapshot::read`] reject a file whose matrix
//! and document list disagree before anything is handed to the store.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::{fs, io};

use crate::embedder::EmbedderConfig;
use crate::error::{RagError, Result};

pub const MAGIC: [u8; 4] = *b"CRVS";
pub const VERSION: u32 = 1;

/// Upper bound on what the decoder will allocate for one snapshot.
const DECODE_LIMIT: usize = 1 << 31;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<DECODE_LIMIT>()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub magic: [u8; 4],
    pub version: u32,
    pub embedder: EmbedderConfig,
    pub documents: Vec<String>,
    pub rows: u64,
    pub cols: u64,
    pub matrix: Vec<f32>,
}

impl Snapshot {
    pub fn new(
        embedder: EmbedderConfig,
        documents: Vec<String>,
        cols: usize,
        matrix: Vec<f32>,
    ) -> Self {
        let rows = if cols == 0 { 0 } else { matrix.len() / cols };
        Self {
            magic: MAGIC,
            version: VERSION,
            embedder,
            documents,
            rows: rows as u64,
            cols: cols as u64,
            matrix,
        }
    }

    /// Check the header and that documents, row/column counts and matrix agree.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(RagError::CorruptSnapshot("bad magic".into()));
        }
        if self.version != VERSION {
            return Err(RagError::CorruptSnapshot(format!(
                "unsupported version {}",
                self.version
            )));
        }
        let cells = self
            .rows
            .checked_mul(self.cols)
            .ok_or_else(|| RagError::CorruptSnapshot("matrix size overflows".into()))?;
        if cells != self.matrix.len() as u64 {
            return Err(RagError::CorruptSnapshot(format!(
                "matrix holds {} floats, header says {}x{}",
                self.matrix.len(),
                self.rows,
                self.cols
            )));
        }
        if self.rows != self.documents.len() as u64 {
            return Err(RagError::CorruptSnapshot(format!(
                "{} documents but {} matrix rows",
                self.documents.len(),
                self.rows
            )));
        }
        if self.rows > 0 && self.cols != self.embedder.dimension as u64 {
            return Err(RagError::CorruptSnapshot(format!(
                "matrix has {} columns, embedder {} produces {}",
                self.cols, self.embedder.model_id, self.embedder.dimension
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(self, bincode_config())?)
    }

    /// Decode and validate.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (snapshot, read): (Snapshot, usize) =
            bincode::serde::decode_from_slice(bytes, bincode_config())
                .map_err(|e| RagError::CorruptSnapshot(e.to_string()))?;
        if read != bytes.len() {
            return Err(RagError::CorruptSnapshot(format!(
                "{} trailing bytes",
                bytes.len() - read
            )));
        }
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Write to `path`, creating parent directories and replacing any existing file.
    ///
    /// The bytes go to a temporary sibling first and are renamed into place, so a
    /// crash mid-write never leaves a truncated snapshot at `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Read from `path`. A missing file is `Ok(None)`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(&bytes).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn embedder() -> EmbedderConfig {
        EmbedderConfig {
            model_id: "hashing:2".into(),
            dimension: 2,
        }
    }

    #[test]
    fn test_encode_errors_keep_their_cause() {
        let err: RagError = bincode::error::EncodeError::Other("writer closed").into();
        assert!(matches!(&err, RagError::SnapshotEncode(msg) if msg.contains("writer closed")));
        assert!(err.to_string().starts_with("Snapshot encoding failed"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/store.bin");
        let snapshot = Snapshot::new(
            embedder(),
            vec!["a".into(), "b".into()],
            2,
            vec![1.0, 0.0, 0.5, 0.5],
        );
        assert_eq!(snapshot.rows, 2);
        snapshot.write(&path).unwrap();

        let read = Snapshot::read(&path).unwrap().unwrap();
        assert_eq!(read, snapshot);
    }

    #[test]
    fn test_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.bin");
        Snapshot::new(embedder(), vec!["a".into()], 2, vec![1.0, 0.0])
            .write(&path)
            .unwrap();
        let empty = Snapshot::new(embedder(), vec![], 2, vec![]);
        empty.write(&path).unwrap();
        assert_eq!(Snapshot::read(&path).unwrap().unwrap(), empty);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(Snapshot::read(&dir.path().join("nope.bin")).unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.bin");
        fs::write(&path, b"definitely not a snapshot").unwrap();
        assert!(matches!(
            Snapshot::read(&path),
            Err(RagError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_truncated_is_corrupt() {
        let bytes = Snapshot::new(embedder(), vec!["a".into()], 2, vec![1.0, 0.0])
            .encode()
            .unwrap();
        assert!(matches!(
            Snapshot::decode(&bytes[..bytes.len() - 3]),
            Err(RagError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_inconsistent_headers_are_corrupt() {
        let good = Snapshot::new(embedder(), vec!["a".into()], 2, vec![1.0, 0.0]);

        let mut bad_rows = good.clone();
        bad_rows.rows = 2;
        assert!(matches!(
            bad_rows.validate(),
            Err(RagError::CorruptSnapshot(_))
        ));

        let mut bad_docs = good.clone();
        bad_docs.documents.push("b".into());
        assert!(matches!(
            bad_docs.validate(),
            Err(RagError::CorruptSnapshot(_))
        ));

        let mut bad_dim = good.clone();
        bad_dim.embedder.dimension = 3;
        assert!(matches!(
            bad_dim.validate(),
            Err(RagError::CorruptSnapshot(_))
        ));

        let mut bad_magic = good;
        bad_magic.magic = *b"PKL1";
        let bytes = bad_magic.encode().unwrap();
        assert!(matches!(
            Snapshot::decode(&bytes),
            Err(RagError::CorruptSnapshot(_))
        ));
    }
}
