//! Voice model descriptors and the NPC voice assignment table.
//!
//! A descriptor is derived entirely from its model URL: the companion config
//! URL and both cache paths are pure functions of it, so two keys sharing a
//! URL share cached files.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::ConfigError;

/// Key every registry must hold before synthesis is attempted.
pub const DEFAULT_VOICE_KEY: &str = "default";

/// Extension appended to a model URL/filename to reach its config.
pub const CONFIG_EXTENSION: &str = ".json";

/// NPC names that ship with a dedicated voice key.
pub const NPC_VOICES: &[(&str, &str)] = &[
    ("Haldor", "Haldor"),
    ("Hildir", "Hildir"),
    ("Hugin", "Hugin"),
    ("Munin", "Munin"),
    ("BogWitch", "BogWitch"),
];

/// Voice key for a named NPC. Unknown names map to themselves and fall back
/// to the default voice at resolve time.
pub fn voice_key_for(npc: &str) -> &str {
    NPC_VOICES
        .iter()
        .find(|(name, _)| *name == npc)
        .map(|(_, key)| *key)
        .unwrap_or(npc)
}

/// Immutable description of one voice and where its files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub key: String,
    pub model_url: String,
    pub config_url: String,
    pub speaker_index: u32,
    pub model_path: PathBuf,
    pub config_path: PathBuf,
}

impl ModelDescriptor {
    /// Build a descriptor rooted at `base_dir`.
    ///
    /// Files land in `<base_dir>/<stem>/<filename>` and
    /// `<base_dir>/<stem>/<filename>.json`, where `filename` is the last
    /// path segment of the model URL.
    pub fn new(
        key: impl Into<String>,
        model_url: impl Into<String>,
        speaker_index: u32,
        base_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let model_url = model_url.into();
        let filename = model_filename(&model_url)?;
        let stem = Path::new(&filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&filename)
            .to_string();
        let dir = base_dir.join(stem);

        Ok(Self {
            key: key.into(),
            config_url: derive_config_url(&model_url),
            speaker_index,
            model_path: dir.join(&filename),
            config_path: dir.join(format!("{filename}{CONFIG_EXTENSION}")),
            model_url,
        })
    }

    pub fn is_default(&self) -> bool {
        self.key == DEFAULT_VOICE_KEY
    }

    /// Directory holding this voice's files.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.model_path.parent()
    }
}

/// Config URL for a model URL: any `?download…` query is dropped, then
/// [`CONFIG_EXTENSION`] is appended.
pub fn derive_config_url(model_url: &str) -> String {
    let base = match model_url.split_once('?') {
        Some((path, query)) if query.starts_with("download") => path,
        _ => model_url,
    };
    format!("{base}{CONFIG_EXTENSION}")
}

/// Filename component of a model URL's path.
pub fn model_filename(model_url: &str) -> Result<String, ConfigError> {
    let malformed = |reason: &str| ConfigError::MalformedUrl {
        url: model_url.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(model_url).map_err(|e| malformed(&e.to_string()))?;
    let filename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    if filename.is_empty() || filename == "." || filename == ".." {
        return Err(malformed("URL path has no file name"));
    }
    Ok(filename.to_string())
}
