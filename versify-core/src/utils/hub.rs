//! Checkpoint file resolution.
//!
//! Each binary needs a tokenizer plus weights (and, for safetensors causal
//! LMs, a `config.json`). They come either from a `--model-path` the user
//! provides, a directory or a single GGUF file, or from the Hugging Face
//! Hub cache via `hf-hub` when no path is given.

use std::path::{Path, PathBuf};

use hf_hub::api::sync::ApiBuilder;
use tracing::info;

use crate::error::{AdapterError, Result};
use crate::utils::safetensors_files;

/// The captioning checkpoint the original tooling shipped with.
pub const DEFAULT_CAPTION_REPO: &str = "Salesforce/blip-image-captioning-base";
/// A small instruct LM; any Qwen2-family checkpoint works.
pub const DEFAULT_VERSE_REPO: &str = "Qwen/Qwen2.5-0.5B-Instruct";

/// Resolved inputs for the caption model.
#[derive(Debug, Clone)]
pub struct CaptionFiles {
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Resolved inputs for the verse model.
#[derive(Debug, Clone)]
pub struct VerseFiles {
    pub tokenizer: PathBuf,
    /// Absent for GGUF weights, which carry their own hyperparameters.
    pub config: Option<PathBuf>,
    pub weights: Vec<PathBuf>,
}

pub fn caption_files(model_path: Option<&Path>) -> Result<CaptionFiles> {
    match model_path {
        Some(path) if is_gguf(path) => Ok(CaptionFiles {
            tokenizer: tokenizer_near(path)?,
            weights: path.to_path_buf(),
        }),
        Some(dir) => Ok(CaptionFiles {
            tokenizer: existing(dir.join("tokenizer.json"))?,
            weights: existing(dir.join("model.safetensors"))?,
        }),
        None => {
            let repo = hub_repo(DEFAULT_CAPTION_REPO)?;
            Ok(CaptionFiles {
                tokenizer: hub_get(&repo, DEFAULT_CAPTION_REPO, "tokenizer.json")?,
                weights: hub_get(&repo, DEFAULT_CAPTION_REPO, "model.safetensors")?,
            })
        }
    }
}

pub fn verse_files(model_path: Option<&Path>) -> Result<VerseFiles> {
    match model_path {
        Some(path) if is_gguf(path) => Ok(VerseFiles {
            tokenizer: tokenizer_near(path)?,
            config: None,
            weights: vec![path.to_path_buf()],
        }),
        Some(dir) => Ok(VerseFiles {
            tokenizer: existing(dir.join("tokenizer.json"))?,
            config: Some(existing(dir.join("config.json"))?),
            weights: safetensors_files(dir)?,
        }),
        None => {
            let repo = hub_repo(DEFAULT_VERSE_REPO)?;
            Ok(VerseFiles {
                tokenizer: hub_get(&repo, DEFAULT_VERSE_REPO, "tokenizer.json")?,
                config: Some(hub_get(&repo, DEFAULT_VERSE_REPO, "config.json")?),
                weights: vec![hub_get(&repo, DEFAULT_VERSE_REPO, "model.safetensors")?],
            })
        }
    }
}

fn is_gguf(path: &Path) -> bool {
    path.is_file() && path.extension().map(|e| e == "gguf").unwrap_or(false)
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(AdapterError::ModelLoad(format!(
            "{} not found",
            path.display()
        )))
    }
}

/// Looks for `tokenizer.json` next to a GGUF file, then one directory up.
fn tokenizer_near(gguf_path: &Path) -> Result<PathBuf> {
    let same_dir = gguf_path
        .parent()
        .unwrap_or(gguf_path)
        .join("tokenizer.json");
    if same_dir.exists() {
        return Ok(same_dir);
    }
    let parent = gguf_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(gguf_path)
        .join("tokenizer.json");
    if parent.exists() {
        return Ok(parent);
    }
    Err(AdapterError::ModelLoad(format!(
        "cannot find tokenizer.json near {}; place it next to the GGUF file",
        gguf_path.display()
    )))
}

fn hub_repo(repo_id: &str) -> Result<hf_hub::api::sync::ApiRepo> {
    let api = ApiBuilder::new()
        .build()
        .map_err(|e| AdapterError::ModelLoad(e.to_string()))?;
    Ok(api.model(repo_id.to_string()))
}

fn hub_get(repo: &hf_hub::api::sync::ApiRepo, repo_id: &str, file: &str) -> Result<PathBuf> {
    info!("resolving {file} from {repo_id}");
    repo.get(file).map_err(|e| {
        AdapterError::ModelLoad(format!("failed to fetch {file} from {repo_id}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_directory_must_contain_the_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = caption_files(Some(dir.path())).unwrap_err();
        assert!(matches!(err, AdapterError::ModelLoad(_)));

        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("model.safetensors"), b"x").unwrap();
        let files = caption_files(Some(dir.path())).unwrap();
        assert!(files.tokenizer.ends_with("tokenizer.json"));
    }

    #[test]
    fn gguf_path_picks_up_the_tokenizer_beside_it() {
        let dir = tempfile::tempdir().unwrap();
        let gguf = dir.path().join("model.gguf");
        std::fs::write(&gguf, b"x").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let files = verse_files(Some(&gguf)).unwrap();
        assert_eq!(files.weights, vec![gguf]);
        assert!(files.config.is_none());
        assert!(files.tokenizer.ends_with("tokenizer.json"));
    }

    #[test]
    fn gguf_without_a_tokenizer_nearby_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("weights");
        std::fs::create_dir(&sub).unwrap();
        let gguf = sub.join("model.gguf");
        std::fs::write(&gguf, b"x").unwrap();

        let err = verse_files(Some(&gguf)).unwrap_err();
        assert!(err.to_string().contains("tokenizer.json"));
    }
}
