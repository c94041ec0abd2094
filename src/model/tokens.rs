use std::sync::OnceLock;

use log::warn;
use thiserror::Error;
use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

use crate::web::models::ChatMessage;

// Framing cost of the OpenAI chat format.
const TOKENS_PER_MESSAGE: usize = 3;
const REPLY_PRIMING_TOKENS: usize = 3;

const WORDS_TO_TOKENS: f64 = 1.3;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("no tokenizer available for model {0}")]
    UnsupportedModel(String),

    #[error("failed to load {0} encoding")]
    Load(&'static str),
}

/// Byte-pair encodings published for OpenAI model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// gpt-4o and the o-series reasoning models
    O200kBase,
    /// gpt-4, gpt-3.5-turbo
    Cl100kBase,
}

impl Encoding {
    /// Deployment prefixes such as `azure/` are ignored.
    fn for_model(model: &str) -> Option<Self> {
        let base = model.rsplit('/').next().unwrap_or(model);
        if ["gpt-4o", "o1", "o3", "o4"]
            .iter()
            .any(|prefix| base.starts_with(prefix))
        {
            Some(Encoding::O200kBase)
        } else if ["gpt-4", "gpt-3.5", "gpt-35", "turbo"]
            .iter()
            .any(|family| base.contains(family))
        {
            Some(Encoding::Cl100kBase)
        } else {
            None
        }
    }

    fn name(self) -> &'static str {
        match self {
            Encoding::O200kBase => "o200k_base",
            Encoding::Cl100kBase => "cl100k_base",
        }
    }

    /// Loaded once per process; a failed load stays failed.
    fn bpe(self) -> Option<&'static CoreBPE> {
        static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();
        static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

        let (cell, load): (_, fn() -> anyhow::Result<CoreBPE>) = match self {
            Encoding::O200kBase => (&O200K, o200k_base),
            Encoding::Cl100kBase => (&CL100K, cl100k_base),
        };
        cell.get_or_init(|| {
            load()
                .map_err(|e| warn!("Failed to load {}: {}", self.name(), e))
                .ok()
        })
        .as_ref()
    }
}

/// Model-aware input token count for a chat prompt.
///
/// Each message costs its encoded role and content plus a fixed framing
/// overhead, and the reply priming is added once.
pub fn count_input_tokens(model: &str, messages: &[ChatMessage]) -> Result<u32, TokenizerError> {
    let encoding = Encoding::for_model(model)
        .ok_or_else(|| TokenizerError::UnsupportedModel(model.to_string()))?;
    let bpe = encoding.bpe().ok_or(TokenizerError::Load(encoding.name()))?;

    let count: usize = messages
        .iter()
        .map(|msg| {
            TOKENS_PER_MESSAGE
                + bpe.encode_ordinary(msg.role.as_str()).len()
                + bpe.encode_ordinary(&msg.content).len()
        })
        .sum::<usize>()
        + REPLY_PRIMING_TOKENS;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Fallback estimate: `round(words * 1.3)` per message, summed.
pub fn estimate_from_words(messages: &[ChatMessage]) -> u32 {
    messages
        .iter()
        .map(|msg| (msg.content.split_whitespace().count() as f64 * WORDS_TO_TOKENS).round() as u32)
        .sum()
}

/// Input token count, falling back to the word estimate when the model has no tokenizer.
pub fn input_tokens(request_id: &str, model: &str, messages: &[ChatMessage]) -> u32 {
    match count_input_tokens(model, messages) {
        Ok(count) => count,
        Err(e) => {
            warn!(
                "Token counter failed, using estimate (request_id: {}, error: {})",
                request_id, e
            );
            estimate_from_words(messages)
        }
    }
}
