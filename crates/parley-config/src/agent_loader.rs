// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Discovery, parsing, and in-place migration of agent configurations.
//!
//! The loader scans the agents directory recursively for `*.yaml` files and
//! produces [`AgentConfigV2`] entries, upgrading older versions as it goes.
//! One bad file never aborts a load: the file is skipped with a warning and
//! the rest of the catalog stays usable.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use lru::LruCache;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::agent::{
    to_snake_case, AgentCatalogEntry, AgentConfigV1, AgentConfigV2, AgentConfiguration,
    CURRENT_AGENT_CONFIG_VERSION,
};
use crate::slug::MnemonicSlug;

/// How long a cached directory listing stays valid.
const DISCOVERY_TTL: Duration = Duration::from_secs(1800);

/// One migration performed during a load.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    pub original_version: u32,
    pub final_version: u32,
    pub file_path: PathBuf,
}

/// Summary of all migrations performed by a loader instance.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub total_migrated: usize,
    pub migrations: HashMap<String, MigrationRecord>,
    pub target_version: u32,
}

#[derive(Default)]
struct LoaderState {
    /// `key` → migrated configuration.
    cache: HashMap<String, AgentConfigV2>,
    /// `name` → migration record for files that were upgraded on load.
    migrations: HashMap<String, MigrationRecord>,
}

/// Loader for the on-disk agent catalog.
///
/// Construct directly for an explicit path, or use [`AgentConfigLoader::shared`]
/// to reuse one instance (and its caches) per directory across the process.
pub struct AgentConfigLoader {
    agents_dir: PathBuf,
    default_model: String,
    state: RwLock<LoaderState>,
    discovery: Mutex<LruCache<PathBuf, (Instant, Vec<PathBuf>)>>,
}

impl AgentConfigLoader {
    pub fn new(agents_dir: impl Into<PathBuf>, default_model: impl Into<String>) -> Self {
        let loader = Self {
            agents_dir: agents_dir.into(),
            default_model: default_model.into(),
            state: RwLock::new(LoaderState::default()),
            discovery: Mutex::new(LruCache::new(NonZeroUsize::new(16).unwrap())),
        };
        loader.load_agents();
        loader
    }

    /// Shared per-directory instance.  Repeated calls with the same path get
    /// the same loader, so the discovery cache and catalog are reused.
    pub fn shared(agents_dir: &Path, default_model: &str) -> Arc<AgentConfigLoader> {
        static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<AgentConfigLoader>>>> =
            OnceLock::new();
        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = registry.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(agents_dir.to_path_buf())
            .or_insert_with(|| Arc::new(AgentConfigLoader::new(agents_dir, default_model)))
            .clone()
    }

    pub fn agents_dir(&self) -> &Path {
        &self.agents_dir
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// (Re)load every agent configuration under the agents directory.
    pub fn load_agents(&self) {
        for path in self.discover_files() {
            self.load_agent_config_file(&path);
        }
    }

    fn discover_files(&self) -> Vec<PathBuf> {
        let mut cache = self.discovery.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((at, files)) = cache.get(&self.agents_dir) {
            if at.elapsed() < DISCOVERY_TTL {
                return files.clone();
            }
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&self.agents_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("yaml"))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        cache.put(self.agents_dir.clone(), (Instant::now(), files.clone()));
        files
    }

    /// Load one configuration file, migrating it if needed.
    ///
    /// Returns `None` (after logging) for unreadable, unparseable, or
    /// unsupported-version files.
    pub fn load_agent_config_file(&self, path: &Path) -> Option<AgentConfigV2> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read agent configuration");
                return None;
            }
        };
        let mut data: serde_yaml::Mapping = match serde_yaml::from_str(&text) {
            Ok(serde_yaml::Value::Mapping(m)) => m,
            Ok(_) => {
                warn!(path = %path.display(), "agent configuration is not a mapping");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse agent configuration");
                return None;
            }
        };

        // Files that predate the version field are v1.
        if !data.contains_key("version") {
            data.insert("version".into(), serde_yaml::Value::from(1u64));
        }
        // Synthesize a stable uid from the file text so reloads of an
        // unchanged file always produce the same identity.
        if !data.contains_key("uid") {
            data.insert("uid".into(), MnemonicSlug::from_seed(3, &text).into());
        }

        if let Err(e) = transform_agent_params(&mut data) {
            warn!(path = %path.display(), error = %e, "invalid agent_params; skipping file");
            return None;
        }

        let version = data
            .get("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u32;
        if version > CURRENT_AGENT_CONFIG_VERSION {
            warn!(path = %path.display(), version, "unsupported agent configuration version");
            return None;
        }

        let value = serde_yaml::Value::Mapping(data);
        let parsed: AgentConfiguration = if version == 1 {
            match serde_yaml::from_value::<AgentConfigV1>(value) {
                Ok(cfg) => AgentConfiguration::V1(cfg),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load v1 agent configuration");
                    return None;
                }
            }
        } else {
            match serde_yaml::from_value::<AgentConfigV2>(value) {
                Ok(cfg) => AgentConfiguration::V2(cfg),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load v2 agent configuration");
                    return None;
                }
            }
        };

        let original_version = parsed.version();
        let config = parsed.into_current();

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if original_version != config.version {
            debug!(name = %config.name, from = original_version, to = config.version,
                   "migrated agent configuration");
            state.migrations.insert(
                config.name.clone(),
                MigrationRecord {
                    original_version,
                    final_version: config.version,
                    file_path: path.to_path_buf(),
                },
            );
        }
        state.cache.insert(config.key.clone(), config.clone());
        Some(config)
    }

    /// `key` → configuration for every loaded agent.
    pub fn catalog(&self) -> HashMap<String, AgentConfigV2> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .cache
            .clone()
    }

    /// Catalog entries for clients, sorted case-insensitively by name.
    pub fn client_catalog(&self) -> Vec<AgentCatalogEntry> {
        let mut entries: Vec<AgentCatalogEntry> = self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .cache
            .values()
            .map(|c| c.as_catalog_entry())
            .collect();
        entries.sort_by_key(|e| e.name.to_lowercase());
        entries
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .cache
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Clone the configuration for `agent_key` so a session can own and
    /// mutate its copy without touching the catalog.
    pub fn duplicate(&self, agent_key: &str) -> anyhow::Result<AgentConfigV2> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .cache
            .get(agent_key)
            .cloned()
            .with_context(|| format!("agent '{agent_key}' not found"))
    }

    /// Persist a new configuration and add it to the catalog.
    pub fn add_agent_config(&self, config: AgentConfigV2) -> anyhow::Result<()> {
        let path = self.agents_dir.join(format!("{}.yaml", config.key));
        std::fs::create_dir_all(&self.agents_dir)
            .with_context(|| format!("creating {}", self.agents_dir.display()))?;
        std::fs::write(&path, config.to_yaml()?)
            .with_context(|| format!("writing {}", path.display()))?;
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .cache
            .insert(config.key.clone(), config);
        self.invalidate_cache();
        Ok(())
    }

    /// Write every migrated configuration back to its original file.
    /// When `backup_dir` is given, the pre-migration text is copied there
    /// first (same file name).
    pub fn save_migrated_configs(&self, backup_dir: Option<&Path>) -> anyhow::Result<()> {
        let (migrations, cache) = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            (state.migrations.clone(), state.cache.clone())
        };
        for (name, record) in &migrations {
            if let Some(dir) = backup_dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating backup dir {}", dir.display()))?;
                let file_name = record
                    .file_path
                    .file_name()
                    .with_context(|| format!("no file name in {}", record.file_path.display()))?;
                std::fs::copy(&record.file_path, dir.join(file_name))
                    .with_context(|| format!("backing up {}", record.file_path.display()))?;
            }
            let config = cache
                .values()
                .find(|c| &c.name == name)
                .with_context(|| format!("migrated agent '{name}' missing from catalog"))?;
            std::fs::write(&record.file_path, config.to_yaml()?)
                .with_context(|| format!("writing {}", record.file_path.display()))?;
        }
        Ok(())
    }

    pub fn migration_report(&self) -> MigrationReport {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        MigrationReport {
            total_migrated: state.migrations.len(),
            migrations: state.migrations.clone(),
            target_version: CURRENT_AGENT_CONFIG_VERSION,
        }
    }

    /// Drop the cached directory listing so the next load rescans the disk.
    pub fn invalidate_cache(&self) {
        self.discovery
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop(&self.agents_dir);
    }

    /// Cache occupancy, mostly for diagnostics endpoints.
    pub fn cache_stats(&self) -> (usize, usize) {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        (state.cache.len(), state.migrations.len())
    }
}

/// Normalize the raw `agent_params` mapping before typed deserialization:
/// mirror `model_name` from the top-level `model_id`, infer the kind tag
/// from the model id when absent, and reject fields that do not belong to
/// the resolved kind.
fn transform_agent_params(data: &mut serde_yaml::Mapping) -> anyhow::Result<()> {
    let model_id = data
        .get("model_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let Some(serde_yaml::Value::Mapping(params)) = data.get_mut("agent_params") else {
        return Ok(());
    };

    if !params.contains_key("model_name") {
        params.insert("model_name".into(), model_id.clone().into());
    }

    if !params.contains_key("type") {
        let lower = model_id.to_lowercase();
        let kind = if lower.contains("claude") {
            if params.contains_key("budget_tokens") || params.contains_key("max_searches") {
                "claude_reasoning"
            } else {
                "claude_non_reasoning"
            }
        } else if lower.contains("gpt") || lower.contains("o1") {
            if params.contains_key("reasoning_effort") {
                "gpt_reasoning"
            } else {
                "gpt_non_reasoning"
            }
        } else {
            "claude_non_reasoning"
        };
        params.insert("type".into(), kind.into());
    }

    let kind = params
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let allowed: &[&str] = match kind.as_str() {
        "claude_reasoning" => &["type", "model_name", "budget_tokens", "max_searches", "max_tokens"],
        "claude_non_reasoning" | "gpt_non_reasoning" => {
            &["type", "model_name", "temperature", "max_tokens"]
        }
        "gpt_reasoning" => &["type", "model_name", "reasoning_effort", "max_tokens"],
        other => bail!("unknown agent_params type '{other}'"),
    };
    for key in params.keys() {
        let Some(name) = key.as_str() else {
            bail!("non-string key in agent_params");
        };
        if !allowed.contains(&name) {
            bail!("field '{name}' is not valid for agent_params type '{kind}'");
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
