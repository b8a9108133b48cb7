//! # Embedders
//!
//! Text → vector boundary of the store.
//!
//! Two implementations ship with the crate:
//! - [`SentenceEmbedder`]: `all-MiniLM-L6-v2` run through Candle (pure Rust), weights
//!   fetched from the Hugging Face Hub on first use. 384 dimensions.
//! - [`HashingEmbedder`]: an offline embedder that hashes character unigrams and
//!   bigrams into signed buckets. Useful without network access and in tests.
//!
//! Each embedder exposes an [`EmbedderConfig`] whose `model_id` identifies it well
//! enough to be re-instantiated with [`embedder_from_id`]. Snapshots store that
//! identifier so a reload can rebuild a compatible embedder.
//!
//! ## Identifiers
//! ```text
//! minilm:sentence-transformers/all-MiniLM-L6-v2
//! hashing:384
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::error::{RagError, Result};

pub const DEFAULT_MINILM_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDER_ID: &str = "minilm:sentence-transformers/all-MiniLM-L6-v2";

/// Identity of an embedder: what produced the vectors and how long they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub model_id: String,
    pub dimension: usize,
}

/// Maps text to fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input, in input order, and
/// must fail with [`RagError::ModelUnavailable`] instead of returning placeholders.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn config(&self) -> EmbedderConfig;
}

/// Parsed form of an embedder identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedderKind {
    MiniLm { repo: String },
    Hashing { dimension: usize },
}

impl EmbedderKind {
    pub fn parse(id: &str) -> Result<Self> {
        let (scheme, rest) = id
            .split_once(':')
            .ok_or_else(|| RagError::ModelUnavailable(format!("unknown embedder id `{id}`")))?;
        match scheme {
            "minilm" if !rest.is_empty() => Ok(EmbedderKind::MiniLm {
                repo: rest.to_string(),
            }),
            "hashing" => {
                let dimension = rest.parse::<usize>().map_err(|_| {
                    RagError::ModelUnavailable(format!("bad hashing dimension in `{id}`"))
                })?;
                if dimension == 0 {
                    return Err(RagError::ModelUnavailable(
                        "hashing embedder needs at least one dimension".into(),
                    ));
                }
                Ok(EmbedderKind::Hashing { dimension })
            }
            _ => Err(RagError::ModelUnavailable(format!(
                "unknown embedder id `{id}`"
            ))),
        }
    }

    pub fn identifier(&self) -> String {
        match self {
            EmbedderKind::MiniLm { repo } => format!("minilm:{repo}"),
            EmbedderKind::Hashing { dimension } => format!("hashing:{dimension}"),
        }
    }
}

/// Build the embedder named by `id`.
///
/// # Errors
/// [`RagError::ModelUnavailable`] if the identifier is unknown or the model cannot load.
pub fn embedder_from_id(id: &str) -> Result<Box<dyn Embedder>> {
    match EmbedderKind::parse(id)? {
        EmbedderKind::MiniLm { repo } => Ok(Box::new(SentenceEmbedder::load(&repo)?)),
        EmbedderKind::Hashing { dimension } => Ok(Box::new(HashingEmbedder::new(dimension)?)),
    }
}

/// Re-instantiate the embedder a snapshot was built with.
pub fn embedder_from_config(config: &EmbedderConfig) -> Result<Box<dyn Embedder>> {
    embedder_from_id(&config.model_id)
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> RagError {
    RagError::ModelUnavailable(format!("{context}: {e}"))
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    repo: String,
    dimension: usize,
}

impl SentenceEmbedder {
    /// Load the model from Hugging Face Hub
    pub fn load(repo_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        let repo = Repo::with_revision(repo_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(|e| unavailable("hub", e))?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo
            .get("config.json")
            .map_err(|e| unavailable("config.json", e))?;
        let tokenizer_filename = api_repo
            .get("tokenizer.json")
            .map_err(|e| unavailable("tokenizer.json", e))?;
        let weights_filename = api_repo
            .get("model.safetensors")
            .map_err(|e| unavailable("model.safetensors", e))?;

        let raw_config = std::fs::read_to_string(config_filename)?;
        let json: serde_json::Value = serde_json::from_str(&raw_config)
            .map_err(|e| unavailable("config.json", e))?;
        let dimension = json
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| RagError::ModelUnavailable("config.json lacks hidden_size".into()))?
            as usize;
        let config: Config =
            serde_json::from_value(json).map_err(|e| unavailable("config.json", e))?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| RagError::ModelUnavailable(format!("Failed to load tokenizer: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)
                .map_err(|e| unavailable("weights", e))?
        };
        let model = BertModel::load(vb, &config).map_err(|e| unavailable("bert", e))?;

        tracing::info!("Loaded sentence embedder {repo_id} ({dimension} dims)");

        Ok(Self {
            model,
            tokenizer,
            device,
            repo: repo_id.to_string(),
            dimension,
        })
    }

    /// Encode text into an embedding
    fn encode(&self, text: &str) -> candle_core::Result<Vec<f32>> {
        // Tokenize with automatic truncation at 512 tokens
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| candle_core::Error::Msg(format!("Tokenization error: {e}")))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;
        let embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;

        embedding.to_vec1::<f32>()
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> candle_core::Result<Tensor> {
        // embeddings: [1, seq_len, hidden], mask: [1, seq_len, 1]
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let masked = embeddings.broadcast_mul(&mask)?;
        let sum = masked.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        sum.broadcast_div(&count)?.squeeze(0)
    }
}

impl Embedder for SentenceEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                self.encode(text)
                    .map_err(|e| RagError::ModelUnavailable(format!("inference failed: {e}")))
            })
            .collect()
    }

    fn config(&self) -> EmbedderConfig {
        EmbedderConfig {
            model_id: EmbedderKind::MiniLm {
                repo: self.repo.clone(),
            }
            .identifier(),
            dimension: self.dimension,
        }
    }
}

/// Feature-hashing embedder over character unigrams and bigrams.
///
/// Whitespace is dropped and letters are lowercased before features are taken, so
/// the embedder works for unsegmented scripts such as Chinese as well as for
/// space-delimited text. Each feature lands in one bucket with a sign taken from
/// the hash, which keeps collisions unbiased.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// # Errors
    /// [`RagError::ModelUnavailable`] if `dimension` is zero.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::ModelUnavailable(
                "hashing embedder needs at least one dimension".into(),
            ));
        }
        Ok(Self { dimension })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let chars: Vec<char> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        let mut buf = String::new();
        for c in &chars {
            buf.clear();
            buf.push('u');
            buf.push(*c);
            self.accumulate(&mut vector, &buf);
        }
        for pair in chars.windows(2) {
            buf.clear();
            buf.push('b');
            buf.push(pair[0]);
            buf.push(pair[1]);
            self.accumulate(&mut vector, &buf);
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str) {
        let digest = blake3::hash(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        let h = u64::from_le_bytes(head);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }

    fn config(&self) -> EmbedderConfig {
        EmbedderConfig {
            model_id: EmbedderKind::Hashing {
                dimension: self.dimension,
            }
            .identifier(),
            dimension: self.dimension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(
            EmbedderKind::parse(DEFAULT_EMBEDDER_ID).unwrap(),
            EmbedderKind::MiniLm {
                repo: DEFAULT_MINILM_REPO.to_string()
            }
        );
        assert_eq!(
            EmbedderKind::parse("hashing:64").unwrap(),
            EmbedderKind::Hashing { dimension: 64 }
        );
        assert!(matches!(
            EmbedderKind::parse("hashing:0"),
            Err(RagError::ModelUnavailable(_))
        ));
        assert!(matches!(
            EmbedderKind::parse("word2vec"),
            Err(RagError::ModelUnavailable(_))
        ));
        assert!(EmbedderKind::parse("faiss:foo").is_err());
    }

    #[test]
    fn test_identifier_round_trips_through_factory() {
        let embedder = embedder_from_id("hashing:128").unwrap();
        let config = embedder.config();
        assert_eq!(config.model_id, "hashing:128");
        assert_eq!(config.dimension, 128);
        assert_eq!(embedder_from_config(&config).unwrap().config(), config);
    }

    #[test]
    fn test_hashing_embedder_is_deterministic_and_order_preserving() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let texts = vec![
            "熱島效應".to_string(),
            "urban heat island".to_string(),
            "熱島效應".to_string(),
        ];
        let first = embedder.embed(&texts).unwrap();
        let second = embedder.embed(&texts).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
        assert!(first.iter().all(|v| v.len() == 256));
    }

    #[test]
    fn test_hashing_embedder_blank_text_is_zero_signal() {
        let embedder = HashingEmbedder::new(32).unwrap();
        let out = embedder.embed(&["".to_string(), "   \n\t".to_string()]).unwrap();
        assert!(out.iter().all(|v| v.iter().all(|x| *x == 0.0)));
    }

    #[test]
    fn test_hashing_embedder_rejects_zero_dimension() {
        assert!(matches!(
            HashingEmbedder::new(0),
            Err(RagError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_hashing_embedder_ignores_case_and_spacing() {
        let embedder = HashingEmbedder::new(128).unwrap();
        let out = embedder
            .embed(&["Heat Island".to_string(), "heatisland".to_string()])
            .unwrap();
        assert_eq!(out[0], out[1]);
    }

    #[test]
    #[ignore] // Requires model download
    fn test_sentence_embedder() {
        let embedder = SentenceEmbedder::load(DEFAULT_MINILM_REPO).unwrap();
        let out = embedder
            .embed(&["Rust is cool.".to_string(), "I love programming.".to_string()])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), embedder.config().dimension);
    }
}
