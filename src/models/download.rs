//! Model download and installation management.
//!
//! Downloads ggml Whisper models from Hugging Face into the user's cache
//! directory, verifying the SHA-1 published in the catalog.

use crate::error::{Result, SpeechError};
use crate::models::catalog::{self, ModelInfo};
use futures_util::StreamExt;
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Get the directory where models are stored.
///
/// Uses `~/.cache/voxserve/models/` on Linux/Unix.
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("voxserve")
        .join("models")
}

/// Full path for a model file, whether or not it exists.
pub fn model_path(name: &str) -> PathBuf {
    let resolved = catalog::resolve_name(name);
    models_dir().join(format!("ggml-{resolved}.bin"))
}

pub fn is_model_installed(name: &str) -> bool {
    model_path(name).exists()
}

fn download_error(name: &str, message: impl Into<String>) -> SpeechError {
    SpeechError::LoadFailed {
        model: name.to_string(),
        message: message.into(),
    }
}

/// Fetch `url` into `output_path`, verifying `sha1` when non-empty.
///
/// Bytes land in a `.part` file that is renamed into place only after the
/// checksum matches, so an interrupted download never looks installed.
async fn download_to_path(
    name: &str,
    url: &str,
    sha1: &str,
    size_mb: u32,
    output_path: &Path,
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| download_error(name, format!("Failed to create models directory: {e}")))?;
    }

    tracing::info!(model = name, size_mb, "Downloading model from {}", url);

    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .map_err(|e| download_error(name, format!("Failed to start download: {e}")))?;

    if !response.status().is_success() {
        return Err(download_error(
            name,
            format!("Download failed with status: {}", response.status()),
        ));
    }

    let total_size = response.content_length().unwrap_or(0);
    let part_path = output_path.with_extension("bin.part");
    let mut file = fs::File::create(&part_path)
        .map_err(|e| download_error(name, format!("Failed to create output file: {e}")))?;

    let mut hasher = Sha1::new();
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;
    let mut last_decile = 0;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| download_error(name, format!("Failed to read download chunk: {e}")))?;
        file.write_all(&chunk)
            .map_err(|e| download_error(name, format!("Failed to write to file: {e}")))?;
        hasher.update(&chunk);

        received += chunk.len() as u64;
        if total_size > 0 {
            let decile = received * 10 / total_size;
            if decile > last_decile {
                last_decile = decile;
                tracing::info!(model = name, "Download {}% complete", decile * 10);
            }
        }
    }
    file.flush()
        .map_err(|e| download_error(name, format!("Failed to write to file: {e}")))?;
    drop(file);

    if !sha1.is_empty() {
        let calculated = format!("{:x}", hasher.finalize());
        if calculated != sha1 {
            if let Err(e) = fs::remove_file(&part_path) {
                tracing::warn!("Failed to remove corrupted download: {}", e);
            }
            return Err(download_error(
                name,
                format!("SHA-1 checksum mismatch. Expected: {sha1}, got: {calculated}"),
            ));
        }
        tracing::debug!(model = name, "Checksum verified");
    }

    fs::rename(&part_path, output_path)
        .map_err(|e| download_error(name, format!("Failed to install model file: {e}")))?;
    tracing::info!(model = name, path = %output_path.display(), "Model installed");
    Ok(())
}

/// Download a model unless it is already installed, returning its path.
///
/// Tries the static catalog first, then falls back to Hugging Face
/// discovery for names outside the catalog.
///
/// # Errors
/// `LoadFailed` when the model is unknown, the transfer fails, the
/// checksum does not match or the file cannot be written.
pub async fn ensure_model(name: &str) -> Result<PathBuf> {
    let path = model_path(name);
    if path.exists() {
        tracing::debug!(model = name, path = %path.display(), "Model already installed");
        return Ok(path);
    }

    if let Some(info) = catalog::get_model(name) {
        download_to_path(name, &info.url(), info.sha1, info.size_mb, &path).await?;
        return Ok(path);
    }

    let remote = crate::models::remote::fetch_remote_models()
        .await
        .map_err(|e| download_error(name, format!("not in catalog and remote fetch failed: {e}")))?;
    let resolved = catalog::resolve_name(name);
    let rm = remote
        .iter()
        .find(|m| m.name == resolved)
        .ok_or_else(|| download_error(name, "not found in catalog or on Hugging Face"))?;

    download_to_path(name, &rm.url, "", rm.size_mb, &path).await?;
    Ok(path)
}

/// Installed model names, discovered from every `ggml-*.bin` file.
pub fn list_installed_models() -> Vec<String> {
    list_installed_in(&models_dir())
}

fn list_installed_in(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            let model = name.to_str()?.strip_prefix("ggml-")?.strip_suffix(".bin")?;
            entry.path().is_file().then(|| model.to_string())
        })
        .collect();

    names.sort();
    names
}

/// Format model information for display.
pub fn format_model_info(model: &ModelInfo) -> String {
    let status = if is_model_installed(model.name) {
        "[installed]"
    } else {
        "[not installed]"
    };
    format!("{:16} {:5} MB   {}", model.name, model.size_mb, status)
}
