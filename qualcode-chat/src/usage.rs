//! Token accounting and cost estimation.

use std::fmt;
use std::ops::AddAssign;

/// Tokens consumed by one or more requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Number of completion requests made.
    pub requests: u64,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Usage of a single request.
    #[must_use]
    pub const fn single(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            requests: 1,
            input_tokens,
            output_tokens,
        }
    }

    /// Usage of a single request whose provider reported nothing, estimated
    /// from the exchanged text.
    #[must_use]
    pub fn estimated(prompt: &str, output: &str) -> Self {
        Self::single(estimate_tokens(prompt), estimate_tokens(output))
    }

    /// `true` when no tokens were counted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.requests += rhs.requests;
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Estimate token count from text using the standard 4-chars-per-token heuristic.
///
/// Counts `char`s rather than bytes and rounds up.
///
/// # Examples
///
/// ```
/// use qualcode_chat::usage::estimate_tokens;
///
/// assert_eq!(estimate_tokens("hello"), 2);  // 5 chars / 4 = 1.25 -> 2
/// assert_eq!(estimate_tokens("hello world"), 3);  // 11 chars / 4 = 2.75 -> 3
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(4) as u64
}

/// Price of a model family in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Price {
    /// Model name prefix this price applies to.
    pub prefix: &'static str,
    /// USD per million prompt tokens.
    pub input_per_million: f64,
    /// USD per million completion tokens.
    pub output_per_million: f64,
}

/// Known list prices. More specific prefixes come first.
const PRICES: &[Price] = &[
    Price { prefix: "gpt-5-nano", input_per_million: 0.05, output_per_million: 0.40 },
    Price { prefix: "gpt-5-mini", input_per_million: 0.25, output_per_million: 2.00 },
    Price { prefix: "gpt-5", input_per_million: 1.25, output_per_million: 10.00 },
    Price { prefix: "gpt-4.1-nano", input_per_million: 0.10, output_per_million: 0.40 },
    Price { prefix: "gpt-4.1-mini", input_per_million: 0.40, output_per_million: 1.60 },
    Price { prefix: "gpt-4.1", input_per_million: 2.00, output_per_million: 8.00 },
    Price { prefix: "gpt-4o-mini", input_per_million: 0.15, output_per_million: 0.60 },
    Price { prefix: "gpt-4o", input_per_million: 2.50, output_per_million: 10.00 },
    Price { prefix: "o4-mini", input_per_million: 1.10, output_per_million: 4.40 },
    Price { prefix: "o3-mini", input_per_million: 1.10, output_per_million: 4.40 },
    Price { prefix: "o3", input_per_million: 2.00, output_per_million: 8.00 },
];

/// Looks up the list price for a model identifier.
///
/// Provider prefixes such as `openai/` are ignored.
#[must_use]
pub fn price_for(model: &str) -> Option<Price> {
    let name = model.rsplit('/').next().unwrap_or(model);
    PRICES.iter().copied().find(|p| name.starts_with(p.prefix))
}

/// Usage and, when the model is priced, the estimated spend of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    /// Model the usage was billed against.
    pub model: String,
    /// Accumulated usage.
    pub usage: TokenUsage,
    /// Estimated USD, `None` when the model has no known price.
    pub usd: Option<f64>,
}

impl CostEstimate {
    /// Prices `usage` for `model`.
    #[must_use]
    pub fn new(model: impl Into<String>, usage: TokenUsage) -> Self {
        let model = model.into();
        #[allow(clippy::cast_precision_loss)]
        let usd = price_for(&model).map(|p| {
            (usage.input_tokens as f64).mul_add(
                p.input_per_million,
                usage.output_tokens as f64 * p.output_per_million,
            ) / 1_000_000.0
        });
        Self { model, usage, usd }
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.usd {
            Some(usd) => write!(f, "${usd:.4}")?,
            None => f.write_str("unknown")?,
        }
        write!(
            f,
            " ({} requests, {} input / {} output tokens)",
            self.usage.requests, self.usage.input_tokens, self.usage.output_tokens
        )
    }
}
