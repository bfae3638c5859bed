use crate::config::DEFAULT_CONTEXTS_DIR;
use crate::error::{AppError, Result};
use crate::rules::ChatContextConfig;
use chrono::Utc;
use log;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigScope {
    App,
    Chat(u64),
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::App => write!(f, "app"),
            ConfigScope::Chat(id) => write!(f, "chat {}", id),
        }
    }
}

/// Where per-app and per-chat rule sets live between turns.
pub trait ContextConfigStore {
    fn load(&self, scope: ConfigScope) -> Result<Option<ChatContextConfig>>;

    /// Validates, stamps `last_updated`, persists and returns the stored
    /// record. Nothing is written when validation fails.
    fn save(&self, scope: ConfigScope, config: ChatContextConfig) -> Result<ChatContextConfig>;

    /// Removes the record for `scope`. `Ok(false)` when there was none.
    fn clear(&self, scope: ConfigScope) -> Result<bool>;

    /// Chat config, else the app config, else an empty config.
    fn resolve(&self, chat_id: Option<u64>) -> Result<ChatContextConfig> {
        if let Some(id) = chat_id {
            if let Some(config) = self.load(ConfigScope::Chat(id))? {
                log::debug!("Using context rules of chat {}", id);
                return Ok(config);
            }
        }
        if let Some(config) = self.load(ConfigScope::App)? {
            log::debug!("Using app-level context rules");
            return Ok(config);
        }
        log::debug!("No stored context rules, using an empty config");
        Ok(ChatContextConfig::default())
    }
}

fn prepare_for_save(mut config: ChatContextConfig) -> Result<ChatContextConfig> {
    config.validate()?;
    config.last_updated = Utc::now();
    Ok(config)
}

/// TOML files under `<root>/.chatctx/contexts/`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(DEFAULT_CONTEXTS_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, scope: ConfigScope) -> PathBuf {
        match scope {
            ConfigScope::App => self.dir.join("app.toml"),
            ConfigScope::Chat(id) => self.dir.join(format!("chat-{}.toml", id)),
        }
    }
}

impl ContextConfigStore for FileConfigStore {
    fn load(&self, scope: ConfigScope) -> Result<Option<ChatContextConfig>> {
        let path = self.path_for(scope);
        if !path.is_file() {
            log::trace!("No context config at {}", path.display());
            return Ok(None);
        }
        log::debug!("Loading {} context config from: {}", scope, path.display());
        let content = fs::read_to_string(&path).map_err(|e| AppError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let config: ChatContextConfig = toml::from_str(&content).map_err(|e| {
            AppError::TomlParse(format!("Failed to parse '{}': {}", path.display(), e))
        })?;
        Ok(Some(config))
    }

    fn save(&self, scope: ConfigScope, config: ChatContextConfig) -> Result<ChatContextConfig> {
        let config = prepare_for_save(config)?;
        let serialized = toml::to_string_pretty(&config)?;
        fs::create_dir_all(&self.dir).map_err(|e| AppError::DirCreation {
            path: self.dir.clone(),
            source: e,
        })?;

        // staged write, then rename into place
        let path = self.path_for(scope);
        let staging = path.with_extension("toml.tmp");
        fs::write(&staging, serialized).map_err(|e| AppError::FileWrite {
            path: staging.clone(),
            source: e,
        })?;
        fs::rename(&staging, &path).map_err(|e| AppError::FileWrite {
            path: path.clone(),
            source: e,
        })?;
        log::info!("Saved {} context config to: {}", scope, path.display());
        Ok(config)
    }

    fn clear(&self, scope: ConfigScope) -> Result<bool> {
        let path = self.path_for(scope);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| AppError::FileWrite {
            path: path.clone(),
            source: e,
        })?;
        log::info!("Removed {} context config: {}", scope, path.display());
        Ok(true)
    }
}

/// In-process store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    records: Mutex<HashMap<ConfigScope, ChatContextConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextConfigStore for MemoryConfigStore {
    fn load(&self, scope: ConfigScope) -> Result<Option<ChatContextConfig>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(&scope).cloned())
    }

    fn save(&self, scope: ConfigScope, config: ChatContextConfig) -> Result<ChatContextConfig> {
        let config = prepare_for_save(config)?;
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.insert(scope, config.clone());
        Ok(config)
    }

    fn clear(&self, scope: ConfigScope) -> Result<bool> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records.remove(&scope).is_some())
    }
}
