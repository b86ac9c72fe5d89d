//! Token usage → estimated spend.

use serde::{Deserialize, Serialize};

/// USD per million tokens, split by direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Default for TokenPricing {
    // claude-3-5-haiku list price
    fn default() -> Self {
        Self { input_per_mtok: 0.80, output_per_mtok: 4.00 }
    }
}

impl TokenPricing {
    pub fn cost_usd(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_per_mtok + completion_tokens as f64 * self.output_per_mtok)
            / 1_000_000.0
    }
}
