//! # RAG chat
//!
//! Ties retrieval and generation together: each question is embedded, the `top_k`
//! closest chunks become the prompt context, the generator answers, and the turn
//! is recorded in the session's history.

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::RagConfig;
use crate::error::Result;
use crate::generator::Generator;
use crate::history::{ChatHistory, ChatTurn};
use crate::retrieval::build_context;
use crate::template::PromptTemplate;
use crate::vector_store::{SearchResult, SharedVectorStore};

pub const DEFAULT_TOP_K: usize = 3;

/// Answer to one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    /// How many retrieved chunks were placed in the prompt.
    pub sources: usize,
}

pub struct RagChat {
    store: SharedVectorStore,
    generator: Box<dyn Generator>,
    template: PromptTemplate,
    history: Mutex<ChatHistory>,
    top_k: usize,
}

impl RagChat {
    pub fn new(
        store: SharedVectorStore,
        generator: Box<dyn Generator>,
        template: PromptTemplate,
        history: ChatHistory,
    ) -> Self {
        Self {
            store,
            generator,
            template,
            history: Mutex::new(history),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn from_config(
        config: &RagConfig,
        store: SharedVectorStore,
        generator: Box<dyn Generator>,
        template: PromptTemplate,
    ) -> Self {
        let history = ChatHistory::new(config.history_max_sessions, config.history_max_turns);
        Self::new(store, generator, template, history).with_top_k(config.top_k)
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Answer `message` for `session_id`.
    ///
    /// The turn is recorded only when generation succeeds.
    pub async fn chat(&self, message: &str, session_id: &str) -> Result<ChatReply> {
        let results = self.store.search(message, self.top_k).await?;
        debug!("Retrieved {} chunks for session {}", results.len(), session_id);

        let context = build_context(&results);
        let prompt = self.template.render(&context, message);
        let response = self
            .generator
            .generate(&self.template.system_prompt, &prompt)
            .await?;

        self.history
            .lock()
            .await
            .record(session_id, message, &response);

        Ok(ChatReply {
            response,
            sources: context.source_count(),
        })
    }

    pub async fn search_documents(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.store.search(query, k).await
    }

    pub async fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        self.history.lock().await.turns(session_id)
    }

    pub async fn clear_history(&self, session_id: &str) -> bool {
        let cleared = self.history.lock().await.clear(session_id);
        if cleared {
            info!("Cleared history for session {}", session_id);
        }
        cleared
    }

    /// Whether there is anything to retrieve from.
    pub async fn is_ready(&self) -> bool {
        !self.store.is_empty().await
    }
}
