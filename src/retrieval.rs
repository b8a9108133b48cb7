//! Turns ranked search hits into the context block handed to the generator.

use std::fmt;

use crate::vector_store::SearchResult;

/// Rendered text for an empty result set.
pub const NO_RELEVANT_DOCUMENTS: &str = "沒有找到相關文檔";

/// Context for one prompt.
///
/// `NoRelevantDocuments` is kept distinct from an empty block so callers can tell
/// "the search found nothing" apart from "the documents were empty".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    Documents { text: String, sources: usize },
    NoRelevantDocuments,
}

impl Context {
    pub fn source_count(&self) -> usize {
        match self {
            Context::Documents { sources, .. } => *sources,
            Context::NoRelevantDocuments => 0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Context::Documents { text, .. } => text,
            Context::NoRelevantDocuments => NO_RELEVANT_DOCUMENTS,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number each hit under a `文檔 N:` heading, keeping the ranked order.
pub fn build_context(results: &[SearchResult]) -> Context {
    if results.is_empty() {
        return Context::NoRelevantDocuments;
    }
    let mut text = String::new();
    for (i, result) in results.iter().enumerate() {
        text.push_str(&format!("文檔 {}:\n{}\n\n", i + 1, result.content));
    }
    Context::Documents {
        text,
        sources: results.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str, score: f32) -> SearchResult {
        SearchResult {
            content: content.to_string(),
            score,
        }
    }

    #[test]
    fn test_numbered_in_supplied_order() {
        let context = build_context(&[hit("第二名", 0.4), hit("第一名", 0.9)]);
        assert_eq!(context.as_str(), "文檔 1:\n第二名\n\n文檔 2:\n第一名\n\n");
        assert_eq!(context.source_count(), 2);
    }

    #[test]
    fn test_empty_results_use_sentinel() {
        let context = build_context(&[]);
        assert_eq!(context, Context::NoRelevantDocuments);
        assert_eq!(context.to_string(), NO_RELEVANT_DOCUMENTS);
        assert_eq!(context.source_count(), 0);
    }

    #[test]
    fn test_blank_chunk_is_not_the_sentinel() {
        let context = build_context(&[hit("", 0.0)]);
        assert_eq!(context.as_str(), "文檔 1:\n\n\n");
        assert_ne!(context, Context::NoRelevantDocuments);
    }
}
