use std::time::{SystemTime, UNIX_EPOCH};

use candle_transformers::generation::LogitsProcessor;

/// Sampling parameters for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Hard cap on generated tokens; generation also stops at EOS.
    pub max_new_tokens: usize,
    /// `None` or zero means greedy decoding.
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    /// Fixed RNG seed; picked from the clock when absent, so repeated runs
    /// with the same input may produce different text.
    pub seed: Option<u64>,
    /// Penalty applied to tokens seen in the trailing context window.
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            temperature: Some(0.8),
            top_p: None,
            seed: None,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
        }
    }
}

impl GenerationConfig {
    pub fn with_max_tokens(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            ..Default::default()
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(299_792_458)
        })
    }

    pub fn logits_processor(&self) -> LogitsProcessor {
        LogitsProcessor::new(self.seed(), self.temperature, self.top_p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_length_is_bounded() {
        let cfg = GenerationConfig::default();
        assert_eq!(cfg.max_new_tokens, 100);
    }

    #[test]
    fn explicit_seed_wins_over_the_clock() {
        let cfg = GenerationConfig {
            seed: Some(42),
            ..Default::default()
        };
        assert_eq!(cfg.seed(), 42);
    }
}
