//! Model discovery on Hugging Face.
//!
//! Lists the ggml files in the `ggerganov/whisper.cpp` repository so
//! quantized and newer models outside the static catalog can be installed.

use crate::error::{Result, SpeechError};

const HF_TREE_URL: &str = "https://huggingface.co/api/models/ggerganov/whisper.cpp/tree/main";
const HF_RESOLVE_BASE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// A model discovered on Hugging Face.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModel {
    pub name: String,
    pub size_mb: u32,
    pub url: String,
    pub english_only: bool,
}

/// Fetch available ggml models from Hugging Face.
///
/// # Errors
/// Returns an error on network failure or unexpected response format.
pub async fn fetch_remote_models() -> Result<Vec<RemoteModel>> {
    let response = reqwest::Client::new()
        .get(HF_TREE_URL)
        .send()
        .await
        .map_err(|e| SpeechError::Other(format!("Failed to fetch Hugging Face model list: {e}")))?;

    if !response.status().is_success() {
        return Err(SpeechError::Other(format!(
            "Hugging Face API returned status {}",
            response.status()
        )));
    }

    let text = response
        .text()
        .await
        .map_err(|e| SpeechError::Other(format!("Failed to read Hugging Face response: {e}")))?;
    parse_tree(&text)
}

/// Parse a repository tree listing into ggml model entries.
///
/// Keeps `ggml-*.bin` files only; Core ML bundles and other artifacts are
/// skipped.
pub fn parse_tree(json: &str) -> Result<Vec<RemoteModel>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| SpeechError::Other(format!("Failed to parse Hugging Face response: {e}")))?;

    let models = entries
        .iter()
        .filter_map(|entry| {
            let path = entry.get("path")?.as_str()?;
            let name = path.strip_prefix("ggml-")?.strip_suffix(".bin")?;

            // LFS metadata carries the real size; the top-level field is the pointer
            let size_bytes = entry
                .get("lfs")
                .and_then(|lfs| lfs.get("size"))
                .and_then(|v| v.as_u64())
                .or_else(|| entry.get("size").and_then(|v| v.as_u64()))
                .unwrap_or(0);

            Some(RemoteModel {
                name: name.to_string(),
                size_mb: (size_bytes / (1024 * 1024)) as u32,
                url: format!("{HF_RESOLVE_BASE}/{path}"),
                english_only: name.contains(".en"),
            })
        })
        .collect();
    Ok(models)
}
