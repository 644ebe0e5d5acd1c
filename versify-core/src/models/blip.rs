//! BLIP image-captioning model.
//!
//! Wraps `candle-transformers`' BLIP conditional-generation implementation,
//! in either the full safetensors or the quantized GGUF variant, behind the
//! [`ImageCaptioner`] seam used by the caption handler.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip::VisionConfig;
use candle_transformers::models::{blip, blip_text, quantized_blip};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::adapter::ImageCaptioner;
use crate::error::{AdapterError, Result};
use crate::models::ModelFormat;

/// `[DEC]`, prepended to start decoding.
const BOS_TOKEN_ID: u32 = 30522;
/// `[SEP]`, ends the caption.
const SEP_TOKEN_ID: u32 = 102;
/// Hard cap on decode steps in case the model never emits `[SEP]`.
const MAX_STEPS: usize = 1000;

/// Normalization constants the BLIP vision tower was trained with.
const IMAGE_SIZE: usize = 384;
const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const IMAGE_STD: [f32; 3] = [0.26862954, 0.261_302_6, 0.275_777_1];

enum BlipWeights {
    Full(blip::BlipForConditionalGeneration),
    Quantized(quantized_blip::BlipForConditionalGeneration),
}

pub struct Model {
    tokenizer: Tokenizer,
    weights: BlipWeights,
    device: Device,
}

/// Architecture parameters of `blip-image-captioning-base`.
fn base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: IMAGE_SIZE,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };
    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

impl Model {
    /// Loads the captioner from a weight file (safetensors or GGUF) and a
    /// `tokenizer.json`.
    pub fn load(weights_path: &Path, tokenizer_path: &Path, device: &Device) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| AdapterError::Tokenizer(e.to_string()))?;

        let config = base_config();
        let weights = match ModelFormat::detect(weights_path) {
            ModelFormat::Gguf => {
                info!("loading quantized BLIP from {}", weights_path.display());
                let vb = quantized_blip::VarBuilder::from_gguf(weights_path, device)
                    .map_err(|e| AdapterError::ModelLoad(e.to_string()))?;
                let model = quantized_blip::BlipForConditionalGeneration::new(&config, vb)
                    .map_err(|e| AdapterError::ModelLoad(e.to_string()))?;
                BlipWeights::Quantized(model)
            }
            ModelFormat::Safetensors => {
                info!("loading BLIP from {}", weights_path.display());
                let vb = unsafe {
                    VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)
                        .map_err(|e| AdapterError::ModelLoad(e.to_string()))?
                };
                let model = blip::BlipForConditionalGeneration::new(&config, vb)
                    .map_err(|e| AdapterError::ModelLoad(e.to_string()))?;
                BlipWeights::Full(model)
            }
        };

        Ok(Self {
            tokenizer,
            weights,
            device: device.clone(),
        })
    }

    fn vision_embeds(&self, image: &Tensor) -> candle_core::Result<Tensor> {
        match &self.weights {
            BlipWeights::Full(m) => image.unsqueeze(0)?.apply(m.vision_model()),
            BlipWeights::Quantized(m) => image.unsqueeze(0)?.apply(m.vision_model()),
        }
    }

    fn decode_step(&mut self, input_ids: &Tensor, image_embeds: &Tensor) -> candle_core::Result<Tensor> {
        match &mut self.weights {
            BlipWeights::Full(m) => m.text_decoder().forward(input_ids, image_embeds),
            BlipWeights::Quantized(m) => m.text_decoder().forward(input_ids, image_embeds),
        }
    }

    fn reset_kv_cache(&mut self) {
        match &mut self.weights {
            BlipWeights::Full(m) => m.text_decoder().reset_kv_cache(),
            BlipWeights::Quantized(m) => m.text_decoder().reset_kv_cache(),
        }
    }
}

/// Opens and decodes an image, scales it to the vision tower's input size
/// and normalizes it into a CHW float tensor on the given device. I/O and
/// decode failures are reported as distinct error kinds.
pub fn load_image(path: &Path, device: &Device) -> Result<Tensor> {
    let img = image::ImageReader::open(path)
        .map_err(|e| AdapterError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| AdapterError::io(path, e))?
        .decode()
        .map_err(|e| AdapterError::image_decode(path, e))?
        .resize_to_fill(
            IMAGE_SIZE as u32,
            IMAGE_SIZE as u32,
            image::imageops::FilterType::Triangle,
        );

    let data = img.to_rgb8().into_raw();
    let data =
        Tensor::from_vec(data, (IMAGE_SIZE, IMAGE_SIZE, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&IMAGE_MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGE_STD, &Device::Cpu)?.reshape((3, 1, 1))?;
    let image = ((data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std))?;
    Ok(image.to_device(device)?)
}

impl ImageCaptioner for Model {
    fn caption(&mut self, image_path: &Path) -> Result<String> {
        let image = load_image(image_path, &self.device)?;
        let image_embeds = self.vision_embeds(&image)?;

        // Seeded greedy decoding: the caption side is deterministic.
        let mut logits_processor = LogitsProcessor::new(1337, None, None);
        let mut token_ids = vec![BOS_TOKEN_ID];
        self.reset_kv_cache();

        for index in 0..MAX_STEPS {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self.decode_step(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = logits_processor.sample(&logits)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }
        debug!("caption decoded in {} tokens", token_ids.len());

        self.tokenizer
            .decode(&token_ids, true)
            .map_err(|e| AdapterError::Tokenizer(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::select_device;

    // Needs real checkpoints; point VERSIFY_BLIP_WEIGHTS and
    // VERSIFY_BLIP_TOKENIZER at them and run with --ignored.
    #[test]
    #[ignore]
    fn captions_a_real_image() {
        let weights = std::env::var("VERSIFY_BLIP_WEIGHTS").unwrap();
        let tokenizer = std::env::var("VERSIFY_BLIP_TOKENIZER").unwrap();
        let image = std::env::var("VERSIFY_TEST_IMAGE").unwrap();

        let device = select_device(true).unwrap();
        let mut model =
            Model::load(Path::new(&weights), Path::new(&tokenizer), &device).unwrap();
        let caption = model.caption(Path::new(&image)).unwrap();
        assert!(!caption.trim().is_empty());
    }

    #[test]
    fn missing_image_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.jpg");

        let err = load_image(&missing, &Device::Cpu).unwrap_err();
        assert!(matches!(err, AdapterError::Io { .. }));
        assert!(err.to_string().contains("missing.jpg"));
    }

    #[test]
    fn non_image_bytes_are_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"definitely not an image").unwrap();

        let err = load_image(&bogus, &Device::Cpu).unwrap_err();
        assert!(matches!(err, AdapterError::ImageDecode { .. }));
    }

    #[test]
    fn valid_image_becomes_a_normalized_chw_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([128, 128, 128]));
        img.save(&path).unwrap();

        let tensor = load_image(&path, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[3, IMAGE_SIZE, IMAGE_SIZE]);
    }
}
