use crate::error::{AppError, Result};
use log;
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Approximates how many model tokens a piece of text will consume.
///
/// Implementations must be deterministic and monotonic: extending a text
/// never lowers its estimate.
pub trait TokenEstimator: Send + Sync + fmt::Debug {
    fn estimate(&self, text: &str) -> usize;

    /// Estimate for content that has not been read, from its byte size.
    fn estimate_bytes(&self, byte_len: u64) -> usize {
        byte_len.div_ceil(BYTES_PER_TOKEN) as usize
    }
}

pub const BYTES_PER_TOKEN: u64 = 4;

const LETTERS_PER_TOKEN: usize = 8;
const DIGITS_PER_TOKEN: usize = 3;
const PUNCT_PER_TOKEN: usize = 3;

/// Word and punctuation counter shaped after BPE pre-tokenization.
///
/// Stays within ±20% of cl100k for typical source code and prose; see the
/// fixture tests below. Good enough for budgeting, not for billing.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut tokens = 0;
        let mut i = 0;

        while i < len {
            let c = chars[i];
            let start = i;
            if c.is_alphabetic() {
                // each camel-case hump is its own word
                let mut hump: usize = 1;
                i += 1;
                while i < len && chars[i].is_alphabetic() {
                    if chars[i].is_uppercase() && chars[i - 1].is_lowercase() {
                        tokens += hump.div_ceil(LETTERS_PER_TOKEN);
                        hump = 1;
                    } else {
                        hump += 1;
                    }
                    i += 1;
                }
                tokens += hump.div_ceil(LETTERS_PER_TOKEN);
            } else if c.is_numeric() {
                while i < len && chars[i].is_numeric() {
                    i += 1;
                }
                tokens += (i - start).div_ceil(DIGITS_PER_TOKEN);
            } else if c.is_whitespace() {
                let mut newline = false;
                while i < len && chars[i].is_whitespace() {
                    newline |= chars[i] == '\n';
                    i += 1;
                }
                // a lone space fuses with the next word
                if newline || i - start > 1 {
                    tokens += 1;
                }
            } else {
                while i < len && !chars[i].is_whitespace() && !chars[i].is_alphanumeric() {
                    i += 1;
                }
                let run = i - start;
                let fuses_with_word = run == 1
                    && !matches!(c, '"' | '\'' | '`')
                    && i < len
                    && chars[i].is_alphabetic();
                if !fuses_with_word {
                    tokens += run.div_ceil(PUNCT_PER_TOKEN);
                }
            }
        }
        tokens
    }
}

/// Exact counts from the cl100k BPE tables bundled with tiktoken-rs.
#[derive(Clone)]
pub struct Cl100kEstimator {
    bpe: Arc<CoreBPE>,
}

impl Cl100kEstimator {
    pub fn new() -> Result<Self> {
        log::debug!("Loading cl100k_base tokenizer tables");
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| AppError::TikToken(e.to_string()))?;
        Ok(Self {
            bpe: Arc::new(bpe),
        })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl fmt::Debug for Cl100kEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cl100kEstimator").finish_non_exhaustive()
    }
}

impl TokenEstimator for Cl100kEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.count(text)
    }
}

pub fn default_estimator() -> Arc<dyn TokenEstimator> {
    Arc::new(HeuristicEstimator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_known_values() {
        let est = HeuristicEstimator;
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("hello world"), 2);
        assert_eq!(est.estimate("fn main() {}"), 4);
        assert_eq!(est.estimate("getUserName"), 3);
        assert_eq!(est.estimate("    let x = 42;\n"), 7);
        assert_eq!(est.estimate("\"name\": \"value\","), 6);
        assert_eq!(est.estimate("1234567"), 3);
        assert_eq!(est.estimate("a.b"), 2);
        assert_eq!(est.estimate("internationalization"), 3);
        assert_eq!(est.estimate("\n\n\n"), 1);
    }

    #[test]
    fn test_heuristic_is_stable() {
        let est = HeuristicEstimator;
        let text = include_str!("tests/fixtures/rust.rs");
        assert_eq!(est.estimate(text), est.estimate(text));
    }

    #[test]
    fn test_heuristic_monotonic_over_prefixes() {
        let est = HeuristicEstimator;
        for text in [
            include_str!("tests/fixtures/app.tsx"),
            include_str!("tests/fixtures/package.json"),
            "getUserName(\"a\").b`c'd  \n\t x=1234567; ÄöüÖ naïve",
        ] {
            let mut previous = 0;
            for (idx, _) in text.char_indices().skip(1) {
                let current = est.estimate(&text[..idx]);
                assert!(
                    current >= previous,
                    "estimate dropped from {} to {} at byte {}",
                    previous,
                    current,
                    idx
                );
                previous = current;
            }
            assert!(est.estimate(text) >= previous);
        }
    }

    #[test]
    fn test_estimate_bytes_rounds_up() {
        let est = HeuristicEstimator;
        assert_eq!(est.estimate_bytes(0), 0);
        assert_eq!(est.estimate_bytes(1), 1);
        assert_eq!(est.estimate_bytes(8), 2);
        assert_eq!(est.estimate_bytes(9), 3);
    }

    #[test]
    fn test_heuristic_within_twenty_percent_of_cl100k() {
        let exact = Cl100kEstimator::new().unwrap();
        let est = HeuristicEstimator;
        let corpora = [
            ("rust.rs", include_str!("tests/fixtures/rust.rs")),
            ("app.tsx", include_str!("tests/fixtures/app.tsx")),
            ("script.py", include_str!("tests/fixtures/script.py")),
            ("README.md", include_str!("tests/fixtures/README.md")),
            ("package.json", include_str!("tests/fixtures/package.json")),
        ];
        for (name, text) in corpora {
            let real = exact.estimate(text) as f64;
            let approx = est.estimate(text) as f64;
            let ratio = approx / real;
            assert!(
                (0.8..=1.2).contains(&ratio),
                "{}: heuristic {} vs cl100k {} (ratio {:.3})",
                name,
                approx,
                real,
                ratio
            );
        }
    }

    #[test]
    fn test_cl100k_counts_simple_text() {
        let exact = Cl100kEstimator::new().unwrap();
        assert_eq!(exact.estimate(""), 0);
        assert_eq!(exact.estimate("fn main() {\n    println!(\"hello\");\n}\n"), 10);
    }

    #[test]
    fn test_cl100k_shared_across_threads() {
        use rayon::prelude::*;

        let exact = Cl100kEstimator::new().unwrap();
        let texts: Vec<&str> = vec![include_str!("tests/fixtures/rust.rs"); 16];
        let expected = exact.estimate(texts[0]);
        let counts: Vec<usize> = texts.par_iter().map(|t| exact.estimate(t)).collect();
        assert!(counts.iter().all(|&c| c == expected));
    }
}
