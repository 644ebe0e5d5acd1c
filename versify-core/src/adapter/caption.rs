use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// The seam between the handler and the captioning model. The real
/// implementation lives in [`crate::models::blip`]; tests substitute mocks.
pub trait ImageCaptioner {
    fn caption(&mut self, image_path: &Path) -> Result<String>;
}

/// One image to describe, taken from the process arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionRequest {
    pub image_path: PathBuf,
}

/// Reply printed on stdout: `{"caption": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CaptionReply {
    Caption { caption: String },
    Error { error: String },
}

impl CaptionReply {
    pub fn caption(text: impl Into<String>) -> Self {
        Self::Caption {
            caption: text.into(),
        }
    }

    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Caption { .. })
    }
}

/// Runs one caption request to completion. Every failure, from an unreadable
/// file to a broken forward pass, comes back as the error variant; the
/// caller only has to print the reply and pick an exit code.
pub fn handle(model: &mut dyn ImageCaptioner, request: &CaptionRequest) -> CaptionReply {
    debug!("captioning {}", request.image_path.display());
    match model.caption(&request.image_path) {
        Ok(caption) => CaptionReply::caption(caption),
        Err(e) => {
            warn!("caption request failed: {e}");
            CaptionReply::error(e)
        }
    }
}
