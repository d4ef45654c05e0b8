//! Token counting and the per-model input budget.
//!
//! Outgoing messages are serialized as a JSON array with `", "` and `": "`
//! separators and every non-ASCII character escaped as `\uXXXX`, then
//! counted with the `cl100k_base` BPE. If the tokenizer cannot be
//! initialized the count falls back to `ceil(chars / 4)`, and the result is flagged
//! [`approximate`](TokenCount::approximate) so the usage display can say so.

use std::io;
use std::sync::OnceLock;

use serde::Serialize;
use serde_json::ser::Formatter;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use paper_analyst_core::models::Message;
use paper_analyst_core::{AnalystError, Result};

/// Characters per token used by the fallback estimate.
const CHARS_PER_TOKEN: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: u64,
    /// True when the character-length estimate was used.
    pub approximate: bool,
}

/// Something that can count tokens in a string.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> TokenCount;
}

/// `cl100k_base` tokenizer with character-length fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cl100kCounter;

fn tokenizer() -> Option<&'static CoreBPE> {
    static TOKENIZER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    TOKENIZER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "tokenizer unavailable; falling back to character estimate");
                None
            }
        })
        .as_ref()
}

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> TokenCount {
        match tokenizer() {
            Some(bpe) => TokenCount {
                tokens: bpe.encode_with_special_tokens(text).len() as u64,
                approximate: false,
            },
            None => EstimateCounter.count(text),
        }
    }
}

/// Character-length estimate only.
#[derive(Debug, Default, Clone, Copy)]
pub struct EstimateCounter;

impl TokenCounter for EstimateCounter {
    fn count(&self, text: &str) -> TokenCount {
        TokenCount {
            tokens: approximate_tokens(text),
            approximate: true,
        }
    }
}

/// `ceil(chars / 4)`.
pub fn approximate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Spaced separators, ASCII-only output.
struct AsciiSpacedFormatter;

impl Formatter for AsciiSpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Canonical serialization used for counting: a JSON array of
/// `{"role", "content"}` objects, spaced and ASCII-escaped.
pub fn serialize_messages(messages: &[Message]) -> Result<String> {
    to_dumps_string(messages)
}

fn to_dumps_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, AsciiSpacedFormatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| AnalystError::SessionFormat(format!("cannot serialize messages: {}", e)))?;
    String::from_utf8(out).map_err(|e| AnalystError::SessionFormat(e.to_string()))
}

/// Count the serialized messages. A serialization failure is an error,
/// never a zero count.
pub fn count_messages(counter: &dyn TokenCounter, messages: &[Message]) -> Result<TokenCount> {
    Ok(counter.count(&serialize_messages(messages)?))
}

/// Reject input that exceeds the model's ceiling. Never truncates.
pub fn check_budget(count: TokenCount, model: &str, ceiling: u64) -> Result<()> {
    debug!(tokens = count.tokens, ceiling, model, "budget check");
    if count.tokens > ceiling {
        return Err(AnalystError::TokenBudgetExceeded {
            tokens: count.tokens,
            model: model.to_string(),
            ceiling,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("abc"), 1);
        assert_eq!(approximate_tokens("abcd"), 1);
        assert_eq!(approximate_tokens("abcde"), 2);
        assert_eq!(approximate_tokens("日本語の"), 1);
    }

    #[test]
    fn estimate_counter_is_flagged_approximate() {
        let count = EstimateCounter.count("abcdefgh");
        assert_eq!(count, TokenCount { tokens: 2, approximate: true });
    }

    #[test]
    fn cl100k_counts_known_text() {
        let count = Cl100kCounter.count("hello world");
        if !count.approximate {
            assert_eq!(count.tokens, 2);
        }
    }

    #[test]
    fn serialization_uses_spaced_separators() {
        let messages = vec![Message::system("s"), Message::user("q")];
        assert_eq!(
            serialize_messages(&messages).unwrap(),
            r#"[{"role": "system", "content": "s"}, {"role": "user", "content": "q"}]"#
        );
    }

    #[test]
    fn non_ascii_is_escaped_as_utf16_units() {
        let messages = vec![Message::user("論文\n😀\"")];
        assert_eq!(
            serialize_messages(&messages).unwrap(),
            r#"[{"role": "user", "content": "\u8ad6\u6587\n\ud83d\ude00\""}]"#
        );
    }

    #[test]
    fn escaped_japanese_counts_more_than_raw_text() {
        let messages = vec![Message::user("研究論文の要約")];
        let escaped = count_messages(&EstimateCounter, &messages).unwrap();
        let raw = EstimateCounter.count(&serde_json::to_string(&messages).unwrap());
        assert!(escaped.tokens > raw.tokens);
    }

    #[test]
    fn serialization_failure_is_an_error_not_empty_text() {
        let mut unkeyable = std::collections::HashMap::new();
        unkeyable.insert((1u8, 2u8), "v");
        assert!(matches!(
            to_dumps_string(&unkeyable),
            Err(AnalystError::SessionFormat(_))
        ));
    }

    #[test]
    fn budget_allows_exact_ceiling() {
        let count = TokenCount { tokens: 100, approximate: false };
        assert!(check_budget(count, "m", 100).is_ok());
    }

    #[test]
    fn budget_rejects_one_over_ceiling() {
        let count = TokenCount { tokens: 101, approximate: false };
        let err = check_budget(count, "GPT41", 100).unwrap_err();
        assert_eq!(
            err,
            AnalystError::TokenBudgetExceeded {
                tokens: 101,
                model: "GPT41".to_string(),
                ceiling: 100
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("101") && msg.contains("GPT41") && msg.contains("100"));
    }
}
