//! # Prompt templates
//!
//! A template is a small YAML document with two fields:
//! - `system_prompt`: the persona and answering rules sent as the system message,
//! - `instructions`: the user-turn body, with `{context}` and `{question}` placeholders.
//!
//! Templates live under the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! system_prompt: "你是一個熱島效應的專家學者。"
//! instructions: |
//!   文檔內容：
//!   {context}
//!
//!   用戶問題：{question}
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{RagError, Result};
use crate::retrieval::Context;

pub const DEFAULT_TEMPLATE_NAME: &str = "heat_island_expert";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system_prompt: String,
    pub instructions: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prompt: "你是一個熱島效應的專家學者。可以根據以下提供的內容回答用戶的問題。回答請精煉至100字內。"
                .to_string(),
            instructions: "文檔內容：\n{context}\n\n用戶問題：{question}\n\n\
如果有問到內容外的問題，可以自行在搜尋額外補充，回答範圍請限制在熱島效應相關的知識上。\n\
如果有超過範圍或不清楚的問題請簡短回答，應答時只需要回答內容相關的回答就好，不需要有多餘的贅字或是說根據甚麼回答。\n\
請用繁體中文回答。"
                .to_string(),
        }
    }
}

impl PromptTemplate {
    /// Fill `{context}` and `{question}`.
    pub fn render(&self, context: &Context, question: &str) -> String {
        self.instructions
            .replace("{context}", context.as_str())
            .replace("{question}", question)
    }
}

/// Load a template from an explicit YAML file.
pub fn load_template_file(path: &Path) -> Result<PromptTemplate> {
    tracing::info!("Loading template: {}", path.display());
    let content = fs::read_to_string(path)?;
    let template: PromptTemplate = serde_yaml::from_str(&content)
        .map_err(|e| RagError::Template(format!("{}: {e}", path.display())))?;
    Ok(template)
}

/// Load a template by name from `<config_dir>/templates/<name>.yaml`.
pub fn load_template(name: &str) -> Result<PromptTemplate> {
    let path = crate::config_dir()?.join(format!("templates/{name}.yaml"));
    load_template_file(&path)
}
