//! Whisper ggml model catalog.
//!
//! STT model ids accepted by the download endpoint are the catalog names
//! below, plus a few aliases and Hugging Face style repo ids that resolve
//! to them.

const HF_RESOLVE_BASE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Metadata for a ggml Whisper model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Model identifier (e.g., "tiny.en", "base", "large-v3-turbo")
    pub name: &'static str,
    /// Model size in megabytes
    pub size_mb: u32,
    /// SHA-1 of the ggml file as published upstream; empty skips verification
    pub sha1: &'static str,
    /// Whether this model supports English only
    pub english_only: bool,
}

impl ModelInfo {
    /// Download URL on Hugging Face.
    pub fn url(&self) -> String {
        format!("{}/ggml-{}.bin", HF_RESOLVE_BASE, self.name)
    }

    /// File name on disk.
    pub fn filename(&self) -> String {
        format!("ggml-{}.bin", self.name)
    }
}

/// Models range from tiny (75 MB, fast) to large-v3 (3094 MB, most accurate).
/// The `.en` suffix marks English-only models.
pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "tiny.en",
        size_mb: 75,
        sha1: "c78c86eb1a8faa21b369bcd33207cc90d64ae9df",
        english_only: true,
    },
    ModelInfo {
        name: "tiny",
        size_mb: 75,
        sha1: "bd577a113a864445d4c299885e0cb97d4ba92b5f",
        english_only: false,
    },
    ModelInfo {
        name: "base.en",
        size_mb: 142,
        sha1: "137c40403d78fd54d454da0f9bd998f78703390c",
        english_only: true,
    },
    ModelInfo {
        name: "base",
        size_mb: 142,
        sha1: "465707469ff3a37a2b9b8d8f89f2f99de7299dac",
        english_only: false,
    },
    ModelInfo {
        name: "small.en",
        size_mb: 466,
        sha1: "db8a495a91d927739e50b3fc1cc4c6b8f6c2d022",
        english_only: true,
    },
    ModelInfo {
        name: "small",
        size_mb: 466,
        sha1: "55356645c2b361a969dfd0ef2c5a50d530afd8d5",
        english_only: false,
    },
    ModelInfo {
        name: "medium.en",
        size_mb: 1533,
        sha1: "8c30f0e44ce9560643ebd10bbe50cd20eafd3723",
        english_only: true,
    },
    ModelInfo {
        name: "medium",
        size_mb: 1533,
        sha1: "fd9727b6e1217c2f614f9b698455c4ffd82463b4",
        english_only: false,
    },
    ModelInfo {
        name: "large-v3",
        size_mb: 3094,
        sha1: "ad82bf6a9043ceed055076d0fd39f5f186ff8062",
        english_only: false,
    },
    ModelInfo {
        name: "large-v3-turbo",
        size_mb: 1624,
        sha1: "4af2b29d7ec73d781377bfd1758ca957a807e941",
        english_only: false,
    },
];

/// Short names that point at a concrete catalog entry.
const ALIASES: &[(&str, &str)] = &[
    ("large", "large-v3-turbo"),
    ("turbo", "large-v3-turbo"),
    ("distil-large-v3", "large-v3-turbo"),
];

/// Normalize a requested model id to a catalog-style name.
///
/// Accepts `ggml-<name>.bin` file names, `org/whisper-<name>` and
/// `org/faster-whisper-<name>` repo ids, and the aliases above. Names that
/// match nothing are returned unchanged (after stripping), so installed
/// files outside the catalog still resolve.
pub fn resolve_name(name: &str) -> String {
    let mut name = name.trim();
    if let Some((_, repo)) = name.rsplit_once('/') {
        name = repo;
    }
    for prefix in ["faster-distil-whisper-", "faster-whisper-", "whisper-", "ggml-"] {
        if let Some(stripped) = name.strip_prefix(prefix) {
            name = stripped;
            break;
        }
    }
    let name = name.strip_suffix(".bin").unwrap_or(name);

    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| (*target).to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Find a model by (resolved) name.
pub fn get_model(name: &str) -> Option<&'static ModelInfo> {
    let resolved = resolve_name(name);
    MODELS.iter().find(|m| m.name == resolved)
}

/// Get all available models.
pub fn list_models() -> &'static [ModelInfo] {
    MODELS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_model_exists() {
        let model = get_model("tiny.en").unwrap();
        assert_eq!(model.name, "tiny.en");
        assert_eq!(model.size_mb, 75);
        assert!(model.english_only);
    }

    #[test]
    fn test_get_model_not_found() {
        assert!(get_model("nonexistent").is_none());
    }

    #[test]
    fn test_resolve_name_strips_file_and_repo_forms() {
        assert_eq!(resolve_name("ggml-small.en.bin"), "small.en");
        assert_eq!(resolve_name("openai/whisper-small.en"), "small.en");
        assert_eq!(resolve_name("Systran/faster-whisper-base"), "base");
        assert_eq!(resolve_name("  tiny  "), "tiny");
    }

    #[test]
    fn test_resolve_name_aliases() {
        assert_eq!(resolve_name("large"), "large-v3-turbo");
        assert_eq!(resolve_name("turbo"), "large-v3-turbo");
        assert_eq!(get_model("large").unwrap().name, "large-v3-turbo");
    }

    #[test]
    fn test_resolve_name_passes_unknown_through() {
        assert_eq!(resolve_name("large-v3-q5_0"), "large-v3-q5_0");
    }

    #[test]
    fn test_all_models_have_huggingface_url() {
        for model in list_models() {
            let url = model.url();
            assert!(url.starts_with("https://huggingface.co/"), "{url}");
            assert!(url.ends_with(&model.filename()), "{url}");
        }
    }

    #[test]
    fn test_checksums_are_sha1_hex() {
        for model in list_models() {
            assert_eq!(model.sha1.len(), 40, "{} checksum length", model.name);
            assert!(model.sha1.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_english_models_have_en_suffix() {
        for model in list_models() {
            assert_eq!(model.english_only, model.name.ends_with(".en"), "{}", model.name);
        }
    }

    #[test]
    fn test_model_names_are_unique() {
        let mut names: Vec<_> = list_models().iter().map(|m| m.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_default_model_is_in_catalog() {
        assert!(get_model(crate::defaults::DEFAULT_STT_MODEL).is_some());
    }
}
