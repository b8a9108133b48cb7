//! # Generator
//!
//! Text generation boundary. The RAG pipeline only needs "prompt in, text out", so
//! the [`Generator`] trait is all the rest of the crate sees; [`OpenAiGenerator`]
//! implements it against any OpenAI-compatible chat completion endpoint.
//!
//! Failures surface as [`RagError::GenerationUnavailable`] and are not retried.
//!
//! # Example
//!
//! ```no_run
//! use climate_rag::generator::{Generator, OpenAiGenerator};
//!
//! # async fn demo() -> climate_rag::error::Result<()> {
//! let generator = OpenAiGenerator::new("http://localhost:5001/v1", "CHANGEME", "gemini-2.0-flash", 0.7);
//! let answer = generator.generate("You are terse.", "What is an urban heat island?").await?;
//! println!("{answer}");
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String>;
}

pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(api_base: &str, api_key: &str, model: &str, temperature: f32) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.to_string())
            .with_api_base(api_base.to_string());
        debug!("Client created for {} at {}", model, api_base);
        Self {
            client: Client::with_config(openai_config),
            model: model.to_string(),
            temperature,
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(
            &config.api_base,
            &config.api_key,
            &config.model,
            config.temperature,
        )
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(system_prompt.to_string()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .temperature(self.temperature)
            .messages(messages)
            .build()
            .map_err(|e| RagError::GenerationUnavailable(e.to_string()))?;

        debug!("Sending request: {:?}", request);

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!("Generation failed: {}", e);
            RagError::GenerationUnavailable(e.to_string())
        })?;

        let text: String = response
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect();

        if text.trim().is_empty() {
            return Err(RagError::GenerationUnavailable(
                "model returned an empty response".into(),
            ));
        }
        Ok(text)
    }
}
