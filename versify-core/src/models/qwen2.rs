//! Qwen2 causal language model used for verse generation.
//!
//! Loads either a safetensors checkpoint directory or a single quantized
//! GGUF file and implements the [`TextGenerator`] seam: prompt in, sampled
//! continuation out.

use std::path::{Path, PathBuf};

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::quantized_qwen2;
use candle_transformers::models::qwen2;
use candle_transformers::utils::apply_repeat_penalty;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::adapter::TextGenerator;
use crate::error::{AdapterError, Result};
use crate::generation::GenerationConfig;
use crate::models::ModelFormat;

/// Tokens that end a generation turn, looked up in the tokenizer vocab.
const EOS_TOKENS: [&str; 3] = ["<|im_end|>", "<|endoftext|>", "</s>"];

enum QwenWeights {
    Full(qwen2::ModelForCausalLM),
    Quantized(quantized_qwen2::ModelWeights),
}

pub struct Model {
    tokenizer: Tokenizer,
    weights: QwenWeights,
    device: Device,
    eos_token_ids: Vec<u32>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field(
                "weights",
                match &self.weights {
                    QwenWeights::Full(_) => &"Full",
                    QwenWeights::Quantized(_) => &"Quantized",
                },
            )
            .field("device", &self.device)
            .field("eos_token_ids", &self.eos_token_ids)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Loads the generator. `weights_paths` is either a set of safetensors
    /// shards (with `config_path` pointing at the matching `config.json`) or
    /// a single GGUF file.
    pub fn load(
        weights_paths: &[PathBuf],
        tokenizer_path: &Path,
        config_path: Option<&Path>,
        device: &Device,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| AdapterError::Tokenizer(e.to_string()))?;

        let first = weights_paths
            .first()
            .ok_or_else(|| AdapterError::ModelLoad("no weight files given".to_string()))?;

        let weights = match ModelFormat::detect(first) {
            ModelFormat::Gguf => {
                info!("loading quantized model from {}", first.display());
                let mut file = std::fs::File::open(first).map_err(|e| AdapterError::io(first, e))?;
                let content = gguf_file::Content::read(&mut file)
                    .map_err(|e| AdapterError::ModelLoad(e.with_path(first).to_string()))?;
                let model = quantized_qwen2::ModelWeights::from_gguf(content, &mut file, device)
                    .map_err(|e| AdapterError::ModelLoad(e.to_string()))?;
                QwenWeights::Quantized(model)
            }
            ModelFormat::Safetensors => {
                let config_path = config_path.ok_or_else(|| {
                    AdapterError::ModelLoad("config.json required for safetensors weights".into())
                })?;
                info!("loading model from {} safetensors shard(s)", weights_paths.len());
                let config_data =
                    std::fs::read(config_path).map_err(|e| AdapterError::io(config_path, e))?;
                let config: qwen2::Config = serde_json::from_slice(&config_data)
                    .map_err(|e| AdapterError::ModelLoad(e.to_string()))?;

                let dtype = if device.is_cpu() { DType::F32 } else { DType::F16 };
                let vb = unsafe {
                    VarBuilder::from_mmaped_safetensors(weights_paths, dtype, device)
                        .map_err(|e| AdapterError::ModelLoad(e.to_string()))?
                };
                let model = qwen2::ModelForCausalLM::new(&config, vb)
                    .map_err(|e| AdapterError::ModelLoad(e.to_string()))?;
                QwenWeights::Full(model)
            }
        };

        let vocab = tokenizer.get_vocab(true);
        let eos_token_ids: Vec<u32> = EOS_TOKENS
            .iter()
            .filter_map(|t| vocab.get(*t).copied())
            .collect();

        Ok(Self {
            tokenizer,
            weights,
            device: device.clone(),
            eos_token_ids,
        })
    }

    /// One forward step; returns the last-position logits as a 1-D tensor.
    fn forward_step(&mut self, input_ids: &Tensor, offset: usize) -> candle_core::Result<Tensor> {
        let logits = match &mut self.weights {
            QwenWeights::Full(m) => m.forward(input_ids, offset)?.squeeze(0)?.squeeze(0)?,
            QwenWeights::Quantized(m) => m.forward(input_ids, offset)?.squeeze(0)?,
        };
        logits.to_dtype(DType::F32)
    }
}

impl TextGenerator for Model {
    fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| AdapterError::Tokenizer(e.to_string()))?
            .get_ids()
            .to_vec();

        let mut logits_processor = config.logits_processor();
        let mut generated: Vec<u32> = Vec::with_capacity(config.max_new_tokens);

        for index in 0..config.max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self.forward_step(&input_ids, start_pos)?;
            let logits = if config.repeat_penalty <= 1. {
                logits
            } else {
                let begin = tokens.len().saturating_sub(config.repeat_last_n);
                apply_repeat_penalty(&logits, config.repeat_penalty, &tokens[begin..])?
            };

            let next = logits_processor.sample(&logits)?;
            if self.eos_token_ids.contains(&next) {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }
        debug!("generated {} tokens", generated.len());

        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| AdapterError::Tokenizer(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::select_device;

    // Needs real checkpoints; point VERSIFY_VERSE_MODEL_DIR at a Qwen2
    // safetensors directory and run with --ignored.
    #[test]
    #[ignore]
    fn generates_a_nonempty_continuation() {
        let dir = PathBuf::from(std::env::var("VERSIFY_VERSE_MODEL_DIR").unwrap());
        let weights = crate::utils::safetensors_files(&dir).unwrap();
        let device = select_device(true).unwrap();
        let mut model = Model::load(
            &weights,
            &dir.join("tokenizer.json"),
            Some(&dir.join("config.json")),
            &device,
        )
        .unwrap();

        let config = GenerationConfig {
            max_new_tokens: 16,
            seed: Some(7),
            ..Default::default()
        };
        let out = model
            .generate("Turn this caption into a poetic verse:\na cat\nPoem:", &config)
            .unwrap();
        assert!(!out.trim().is_empty());
    }

    #[test]
    fn missing_weight_list_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = dir.path().join("tokenizer.json");
        std::fs::write(&tokenizer, "{}").unwrap();

        // Empty weight set fails before the tokenizer contents even matter.
        let err = Model::load(&[], &tokenizer, None, &Device::Cpu).unwrap_err();
        assert!(matches!(
            err,
            AdapterError::ModelLoad(_) | AdapterError::Tokenizer(_)
        ));
    }
}
