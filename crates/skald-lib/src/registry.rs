//! Voice model registry: symbolic speaker keys → cached model files.
//!
//! Descriptors are published whole behind an `RwLock`, so a resolve never
//! sees a half-built entry. Loading runs every model concurrently; each
//! file is guarded by its own async lock so a file shared by several keys,
//! or requested by overlapping load passes, is fetched at most once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use skald_core::types::{SkaldConfig, VoiceStatus};
use skald_core::voice::{DEFAULT_VOICE_KEY, ModelDescriptor};

use crate::download::FileFetcher;
use crate::error::{ConfigError, FetchError};

/// What a load pass did for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Both files were already present.
    Cached,
    /// At least one file was fetched.
    Downloaded,
}

/// Outcome of loading one registered model.
#[derive(Debug)]
pub struct ModelLoadReport {
    pub key: String,
    pub result: Result<LoadStatus, FetchError>,
}

impl ModelLoadReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct VoiceModelRegistry {
    base_dir: PathBuf,
    models: RwLock<HashMap<String, Arc<ModelDescriptor>>>,
    fetcher: Arc<dyn FileFetcher>,
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl VoiceModelRegistry {
    pub fn new(base_dir: impl Into<PathBuf>, fetcher: Arc<dyn FileFetcher>) -> Self {
        Self {
            base_dir: base_dir.into(),
            models: RwLock::new(HashMap::new()),
            fetcher,
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the default voice and any extra voices
    /// from `config`.
    pub fn from_config(
        config: &SkaldConfig,
        fetcher: Arc<dyn FileFetcher>,
    ) -> Result<Self, ConfigError> {
        let registry = Self::new(&config.voices_dir, fetcher);
        registry.register_url(
            DEFAULT_VOICE_KEY,
            &config.default_model_url,
            config.default_speaker_index,
        )?;
        for voice in &config.voices {
            registry.register_url(&voice.key, &voice.model_url, voice.speaker_index)?;
        }
        Ok(registry)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Insert or replace the descriptor under its key. Returns the previous
    /// descriptor, if any.
    pub fn register(&self, descriptor: ModelDescriptor) -> Option<Arc<ModelDescriptor>> {
        let descriptor = Arc::new(descriptor);
        debug!(
            "registry: {} → {}",
            descriptor.key,
            descriptor.model_path.display()
        );
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.key.clone(), descriptor)
    }

    /// Build a descriptor for `model_url` under this registry's base
    /// directory and register it.
    pub fn register_url(
        &self,
        key: &str,
        model_url: &str,
        speaker_index: u32,
    ) -> Result<Arc<ModelDescriptor>, ConfigError> {
        let descriptor = ModelDescriptor::new(key, model_url, speaker_index, &self.base_dir)?;
        self.register(descriptor);
        self.resolve(key)
    }

    /// Register `descriptor`; when it replaces the default voice, run a fresh
    /// load pass and return its reports. Files cached for other keys are
    /// left untouched.
    pub async fn register_and_refresh(
        &self,
        descriptor: ModelDescriptor,
    ) -> Option<Vec<ModelLoadReport>> {
        let is_default = descriptor.is_default();
        self.register(descriptor);
        if is_default {
            info!("registry: default voice changed, reloading models");
            Some(self.ensure_all_loaded().await)
        } else {
            None
        }
    }

    /// Descriptor for `key`, falling back to the default voice.
    pub fn resolve(&self, key: &str) -> Result<Arc<ModelDescriptor>, ConfigError> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        models
            .get(key)
            .or_else(|| models.get(DEFAULT_VOICE_KEY))
            .cloned()
            .ok_or(ConfigError::MissingDefault)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Snapshot of every registered descriptor, sorted by key.
    pub fn descriptors(&self) -> Vec<Arc<ModelDescriptor>> {
        let mut all: Vec<_> = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn status(&self) -> Vec<VoiceStatus> {
        self.descriptors()
            .into_iter()
            .map(|d| VoiceStatus {
                key: d.key.clone(),
                model_url: d.model_url.clone(),
                speaker_index: d.speaker_index,
                model_cached: d.model_path.is_file(),
                config_cached: d.config_path.is_file(),
            })
            .collect()
    }

    /// Fetch every missing model and config file, all models concurrently.
    /// One model failing does not stop the others.
    pub async fn ensure_all_loaded(&self) -> Vec<ModelLoadReport> {
        let descriptors = self.descriptors();
        let loads = descriptors.iter().map(|d| async move {
            let result = self.ensure_loaded(d).await;
            match &result {
                Ok(LoadStatus::Downloaded) => info!("voice '{}' downloaded", d.key),
                Ok(LoadStatus::Cached) => debug!("voice '{}' already cached", d.key),
                Err(e) => warn!("voice '{}' failed to load: {e}", d.key),
            }
            ModelLoadReport {
                key: d.key.clone(),
                result,
            }
        });
        join_all(loads).await
    }

    /// Fetch whichever of the descriptor's two files are missing.
    pub async fn ensure_loaded(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<LoadStatus, FetchError> {
        let (model, config) = tokio::join!(
            self.fetch_if_missing(&descriptor.model_url, &descriptor.model_path),
            self.fetch_if_missing(&descriptor.config_url, &descriptor.config_path),
        );
        match (model?, config?) {
            (LoadStatus::Cached, LoadStatus::Cached) => Ok(LoadStatus::Cached),
            _ => Ok(LoadStatus::Downloaded),
        }
    }

    async fn fetch_if_missing(&self, url: &str, dest: &Path) -> Result<LoadStatus, FetchError> {
        let lock = self
            .file_locks
            .lock()
            .await
            .entry(dest.to_path_buf())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Ok(LoadStatus::Cached);
        }
        info!("fetching {url}");
        self.fetcher.fetch(url, dest).await?;
        Ok(LoadStatus::Downloaded)
    }
}
