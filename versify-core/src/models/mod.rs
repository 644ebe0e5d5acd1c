pub mod blip;
pub mod qwen2;

pub use candle_core;
pub use candle_core::{DType, Device, Tensor};

/// Format of model weights on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// Standard HuggingFace safetensors directory.
    Safetensors,
    /// Single GGUF quantized file.
    Gguf,
}

impl ModelFormat {
    /// A `.gguf` file is quantized; anything else is treated as a
    /// safetensors checkpoint directory.
    pub fn detect(path: &std::path::Path) -> Self {
        if path.is_file() && path.extension().map(|e| e == "gguf").unwrap_or(false) {
            Self::Gguf
        } else {
            Self::Safetensors
        }
    }
}
