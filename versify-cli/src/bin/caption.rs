//! One-shot image captioning.
//!
//! `caption <image_path>` prints exactly one JSON object on stdout,
//! `{"caption": ...}` on success or `{"error": ...}` on any failure, and
//! exits 0 or 1 accordingly. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use versify_core::adapter::{self, caption, CaptionReply, CaptionRequest};
use versify_core::error::Result;
use versify_core::models::blip;
use versify_core::utils::{hub, select_device};

#[derive(Parser, Debug)]
#[command(name = "caption", about = "Describe an image, replying in JSON on stdout")]
struct Args {
    /// Image file to describe
    image_path: PathBuf,

    /// Checkpoint directory or GGUF file; fetched from the Hugging Face Hub
    /// when omitted
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Use CPU even if a GPU is available
    #[arg(long)]
    cpu: bool,
}

fn load_model(args: &Args) -> Result<blip::Model> {
    let device = select_device(args.cpu)?;
    let files = hub::caption_files(args.model_path.as_deref())?;
    info!("loading caption model on {device:?}");
    blip::Model::load(&files.weights, &files.tokenizer, &device)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let request = CaptionRequest {
        image_path: args.image_path.clone(),
    };

    let reply = match load_model(&args) {
        Ok(mut model) => caption::handle(&mut model, &request),
        Err(e) => CaptionReply::error(e),
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
    fn image_path_is_required() {
        assert!(Args::try_parse_from(["caption"]).is_err());
    }

    #[test]
    fn flags_parse() {
        let args =
            Args::try_parse_from(["caption", "cat.jpg", "--cpu", "--model-path", "ckpt"]).unwrap();
        assert_eq!(args.image_path, PathBuf::from("cat.jpg"));
        assert!(args.cpu);
        assert_eq!(args.model_path, Some(PathBuf::from("ckpt")));
    }
}
