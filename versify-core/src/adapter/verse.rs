use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};
use crate::generation::GenerationConfig;

/// The seam between the handler and the text-generation model. Returns only
/// the generated continuation, without the prompt.
pub trait TextGenerator {
    fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> Result<String>;
}

/// Error string emitted when the request carries no usable caption.
pub const NO_CAPTION: &str = "No caption provided";

/// Marker separating the instruction from the generated poem. Everything the
/// model produces after the last occurrence of this marker is the poem.
const POEM_MARKER: &str = "Poem:";

/// One caption to reword, parsed from a JSON document on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerseRequest {
    #[serde(default)]
    pub caption: Option<String>,
}

impl VerseRequest {
    /// Parses a complete stdin document. A document that is not a JSON
    /// object at all is an input error; an object without a caption field
    /// parses fine and is rejected later by [`handle`].
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| AdapterError::Input(format!("invalid request: {e}")))
    }
}

/// Reply printed on stdout: `{"poem": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum VerseReply {
    Poem { poem: String },
    Error { error: String },
}

impl VerseReply {
    pub fn poem(text: impl Into<String>) -> Self {
        Self::Poem { poem: text.into() }
    }

    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Poem { .. })
    }
}

/// Checks that the request carries a usable caption and returns it. Called
/// by [`handle`], and also useful on its own to reject a request before the
/// model is even loaded.
pub fn validate(request: &VerseRequest) -> Result<&str> {
    match request.caption.as_deref() {
        Some(caption) if !caption.is_empty() => Ok(caption),
        _ => Err(AdapterError::Input(NO_CAPTION.to_string())),
    }
}

fn build_prompt(caption: &str) -> String {
    format!("Turn this caption into a poetic verse:\n{caption}\n{POEM_MARKER}")
}

/// Cuts the poem out of the generated continuation. The prompt already ends
/// with the marker, so usually the whole continuation is the poem; some
/// models echo the marker again before settling down, in which case only the
/// text after its last occurrence counts.
fn extract_poem(continuation: &str) -> String {
    continuation
        .rsplit(POEM_MARKER)
        .next()
        .unwrap_or(continuation)
        .trim()
        .to_string()
}

/// Runs one verse request to completion. A missing or empty caption is
/// rejected without touching the model; any model failure comes back as the
/// error variant.
pub fn handle(
    model: &mut dyn TextGenerator,
    config: &GenerationConfig,
    request: &VerseRequest,
) -> VerseReply {
    let caption = match validate(request) {
        Ok(caption) => caption,
        Err(e) => return VerseReply::error(e),
    };

    let prompt = build_prompt(caption);
    debug!("generating verse for caption of {} chars", caption.len());
    match model.generate(&prompt, config) {
        Ok(continuation) => VerseReply::poem(extract_poem(&continuation)),
        Err(e) => {
            warn!("verse request failed: {e}");
            VerseReply::error(e)
        }
    }
}
