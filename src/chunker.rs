//! # Chunker
//!
//! Produces the chunks the vector store indexes.
//!
//! [`TextSplitter`] splits recursively on paragraph, line, word and finally character
//! boundaries, then greedily merges the pieces back into chunks of at most
//! `chunk_size` characters, carrying up to `chunk_overlap` characters of trailing
//! pieces into the next chunk.
//!
//! [`DocumentProcessor`] reads files, prefixes code files with a small header naming
//! the path and kind, splits them, and drops chunks too short to be useful.

use std::path::{Path, PathBuf};
use std::{fs, io};

use ignore::WalkBuilder;
use tracing::{info, warn};

use crate::error::Result;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

const CODE_EXTENSIONS: [&str; 8] = ["tsx", "ts", "jsx", "js", "py", "html", "css", "rs"];
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "json"];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let (position, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined = if window.is_empty() { 0 } else { sep_len };
            if total + joined + len > self.chunk_size && !window.is_empty() {
                let chunk = window.join(separator).trim().to_string();
                if !chunk.is_empty() {
                    chunks.push(chunk);
                }
                // Keep a tail no longer than the overlap that still leaves room.
                while !window.is_empty()
                    && (total > self.chunk_overlap
                        || total + sep_len + len > self.chunk_size)
                {
                    let dropped = char_len(window.remove(0));
                    total -= dropped;
                    if !window.is_empty() {
                        total -= sep_len;
                    }
                }
            }
            if !window.is_empty() {
                total += sep_len;
            }
            total += len;
            window.push(piece);
        }

        let chunk = window.join(separator).trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        chunks
    }
}

/// Reads files and turns them into indexable chunks.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    splitter: TextSplitter,
    min_chunk_chars: usize,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self {
            splitter: TextSplitter::default(),
            min_chunk_chars: 50,
        }
    }
}

impl DocumentProcessor {
    pub fn new(splitter: TextSplitter, min_chunk_chars: usize) -> Self {
        Self {
            splitter,
            min_chunk_chars,
        }
    }

    /// Split raw text and keep chunks longer than `min_chunk_chars` after trimming.
    pub fn process_text(&self, text: &str) -> Vec<String> {
        self.splitter
            .split_text(text)
            .into_iter()
            .filter(|c| char_len(c.trim()) > self.min_chunk_chars)
            .collect()
    }

    /// Chunk every readable file in `paths`. Unreadable files are logged and skipped.
    pub fn process_text_files(&self, paths: &[PathBuf]) -> Vec<String> {
        let mut all_chunks = Vec::new();
        for path in paths {
            match self.load_file(path) {
                Ok(content) => {
                    let chunks = self.process_text(&content);
                    info!("Processed {}: {} chunks", path.display(), chunks.len());
                    all_chunks.extend(chunks);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        all_chunks
    }

    fn load_file(&self, path: &Path) -> Result<String> {
        let raw = fs::read_to_string(path)?;
        let content = raw.strip_prefix('\u{feff}').unwrap_or(&raw);

        let extension = extension_of(path);
        if CODE_EXTENSIONS.contains(&extension.as_str()) {
            let kind = if extension == "tsx" {
                "React TypeScript組件"
            } else {
                "程式碼檔案"
            };
            Ok(format!(
                "檔案路徑: {}\n檔案類型: {}\n\n{}",
                path.display(),
                kind,
                content
            ))
        } else {
            Ok(content.to_string())
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    let extension = extension_of(path);
    CODE_EXTENSIONS.contains(&extension.as_str()) || TEXT_EXTENSIONS.contains(&extension.as_str())
}

/// Every supported file under `dir`, recursively, in sorted order.
///
/// Hidden entries are skipped and symlinks are not followed. Entries that cannot
/// be read are logged and skipped.
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )
        .into());
    }

    let mut builder = WalkBuilder::new(dir);
    builder.hidden(true).follow_links(false);

    let mut files = Vec::new();
    for result in builder.build() {
        match result {
            Ok(entry) => {
                let Some(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_file() && is_supported(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 10);
        assert_eq!(
            splitter.split_text("熱島效應\n\n城市溫度"),
            vec!["熱島效應\n\n城市溫度".to_string()]
        );
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = TextSplitter::new(40, 10);
        let text = "The urban heat island effect raises city temperatures. ".repeat(20);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "{chunk:?}");
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn test_overlap_carries_words() {
        let splitter = TextSplitter::new(20, 8);
        let chunks = splitter.split_text("alpha beta gamma delta epsilon zeta");
        assert_eq!(chunks[0], "alpha beta gamma");
        assert!(chunks[1].starts_with("gamma"));
    }

    #[test]
    fn test_unbroken_text_splits_by_character() {
        let splitter = TextSplitter::new(5, 0);
        let chunks = splitter.split_text("熱島效應是指城市溫度高於周邊地區");
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
        assert_eq!(chunks.concat(), "熱島效應是指城市溫度高於周邊地區");
    }

    #[test]
    fn test_short_chunks_are_dropped() {
        let processor = DocumentProcessor::new(TextSplitter::new(500, 50), 10);
        assert!(processor.process_text("太短").is_empty());
        assert_eq!(
            processor.process_text("這是一段足夠長的文字，用來說明熱島效應。").len(),
            1
        );
    }

    #[test]
    fn test_code_files_get_header_and_bad_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let tsx = dir.path().join("Chat.tsx");
        fs::write(&tsx, "\u{feff}export const Chat = () => <div>RAG 聊天機器人</div>;").unwrap();
        let missing = dir.path().join("missing.md");

        let processor = DocumentProcessor::new(TextSplitter::default(), 10);
        let chunks = processor.process_text_files(&[tsx.clone(), missing]);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with(&format!("檔案路徑: {}", tsx.display())));
        assert!(chunks[0].contains("React TypeScript組件"));
        assert!(!chunks[0].contains('\u{feff}'));
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::write(dir.path().join("sub/a.py"), "a").unwrap();
        fs::write(dir.path().join("image.png"), "x").unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("b.md"), dir.path().join("sub/a.py")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_files_does_not_follow_symlinked_dirs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("notes/b.txt"), "b").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("notes"), dir.path().join("alias")).unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.md"), dir.path().join("notes/b.txt")]
        );
    }

    #[test]
    fn test_collect_files_rejects_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(collect_files(&dir.path().join("absent")).is_err());
    }
}
