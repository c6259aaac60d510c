//! Prompt size measurement.
//!
//! Prompts are counted with the `cl100k_base` encoding. If the encoding
//! cannot be loaded, a four-bytes-per-token estimate is used instead.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

static ENCODING: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoding() -> Option<&'static CoreBPE> {
    ENCODING
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!("cl100k_base unavailable, estimating token counts: {}", e);
                None
            }
        })
        .as_ref()
}

/// Token count of `text` under `cl100k_base`.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    match encoding() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate_tokens(text),
    }
}

/// Rough token count: one token per four bytes, at least one for non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        (text.len() / 4).max(1)
    }
}
