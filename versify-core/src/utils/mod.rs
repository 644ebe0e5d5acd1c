pub mod hub;

use std::path::{Path, PathBuf};

use candle_core::{
    utils::{cuda_is_available, metal_is_available},
    Device,
};

use crate::error::{AdapterError, Result};

/// Picks the best available device, preferring CUDA, then Metal, then CPU.
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

/// Lists the safetensors shards of a checkpoint directory, sorted so shard
/// order is stable across platforms.
pub fn safetensors_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| AdapterError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "safetensors").unwrap_or(false))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(AdapterError::ModelLoad(format!(
            "no safetensors files in {}",
            dir.display()
        )));
    }
    Ok(files)
}
