//! One-shot verse generation.
//!
//! Reads a `{"caption": ...}` JSON document from stdin and prints exactly
//! one JSON object on stdout, `{"poem": ...}` on success or `{"error": ...}`
//! on any failure, exiting 0 or 1 accordingly. A missing or empty caption is
//! rejected before the model is loaded. Logs go to stderr.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use versify_core::adapter::{self, verse, VerseReply, VerseRequest};
use versify_core::error::Result;
use versify_core::generation::GenerationConfig;
use versify_core::models::qwen2;
use versify_core::utils::{hub, select_device};

#[derive(Parser, Debug)]
#[command(
    name = "verse",
    about = "Turn a caption from stdin into a short poem, replying in JSON on stdout"
)]
struct Args {
    /// Checkpoint directory or GGUF file; fetched from the Hugging Face Hub
    /// when omitted
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Use CPU even if a GPU is available
    #[arg(long)]
    cpu: bool,

    /// Cap on generated tokens
    #[arg(long, default_value_t = 100)]
    max_new_tokens: usize,

    /// Sampling temperature; 0 selects greedy decoding
    #[arg(long, default_value_t = 0.8)]
    temperature: f64,

    /// Fix the RNG seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_new_tokens,
            temperature: (self.temperature > 0.).then_some(self.temperature),
            seed: self.seed,
            ..Default::default()
        }
    }
}

fn load_model(args: &Args) -> Result<qwen2::Model> {
    let device = select_device(args.cpu)?;
    let files = hub::verse_files(args.model_path.as_deref())?;
    info!("loading verse model on {device:?}");
    qwen2::Model::load(
        &files.weights,
        &files.tokenizer,
        files.config.as_deref(),
        &device,
    )
}

fn run(args: &Args, input: &str) -> VerseReply {
    let request = match VerseRequest::from_json(input) {
        Ok(request) => request,
        Err(e) => return VerseReply::error(e),
    };
    // Reject empty requests before paying for model load.
    if let Err(e) = verse::validate(&request) {
        return VerseReply::error(e);
    }

    match load_model(args) {
        Ok(mut model) => verse::handle(&mut model, &args.generation_config(), &request),
        Err(e) => VerseReply::error(e),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut input = String::new();
    let reply = match std::io::stdin().read_to_string(&mut input) {
        Ok(_) => run(&args, &input),
        Err(e) => VerseReply::error(format!("failed to read stdin: {e}")),
    };

    adapter::emit(&reply);
    if reply.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let args = Args::try_parse_from(["verse"]).unwrap();
        assert_eq!(args.max_new_tokens, 100);
        let cfg = args.generation_config();
        assert_eq!(cfg.max_new_tokens, 100);
        assert_eq!(cfg.temperature, Some(0.8));
    }

    #[test]
    fn zero_temperature_means_greedy() {
        let args = Args::try_parse_from(["verse", "--temperature", "0"]).unwrap();
        assert_eq!(args.generation_config().temperature, None);
    }

    #[test]
    fn empty_caption_is_rejected_without_a_model() {
        // No checkpoint exists at this path; the request must be rejected
        // before the loader ever runs.
        let args = Args::try_parse_from(["verse", "--model-path", "/nonexistent"]).unwrap();
        let reply = run(&args, r#"{"caption": ""}"#);
        assert_eq!(reply, VerseReply::error(verse::NO_CAPTION));

        let reply = run(&args, "{}");
        assert_eq!(reply, VerseReply::error(verse::NO_CAPTION));
    }

    #[test]
    fn malformed_stdin_is_an_input_error() {
        let args = Args::try_parse_from(["verse", "--model-path", "/nonexistent"]).unwrap();
        let reply = run(&args, "not json");
        assert!(!reply.is_ok());
    }
}
