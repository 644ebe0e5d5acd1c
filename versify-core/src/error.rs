use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between reading the input and printing the
/// reply. The kinds are kept separate so callers can tell a bad request from
/// a broken checkpoint from a failed forward pass.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The request itself is unusable (missing field, unparseable JSON).
    #[error("{0}")]
    Input(String),

    /// A file we need could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file was readable but is not a decodable image.
    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Checkpoint resolution or weight deserialization failed.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The model itself failed during the forward pass or sampling.
    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),
}

impl AdapterError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn image_decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::ImageDecode {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = AdapterError> = std::result::Result<T, E>;
