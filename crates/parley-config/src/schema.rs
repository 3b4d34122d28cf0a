// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_max_delay() -> u64 {
    120
}

fn default_concurrency() -> usize {
    3
}

/// Root message role for the system prompt at index 0 of the message array.
///
/// Most models expect `system`; certain reasoning model families require
/// `developer` instead.  The process-wide default comes from the
/// `ROOT_MESSAGE_ROLE` environment variable, read once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootMessageRole {
    #[default]
    System,
    Developer,
}

impl RootMessageRole {
    /// Parse the `ROOT_MESSAGE_ROLE` environment value.  Unknown values fall
    /// back to `System` with a warning rather than failing startup.
    pub fn from_env() -> Self {
        match std::env::var("ROOT_MESSAGE_ROLE").ok().as_deref() {
            Some("developer") => Self::Developer,
            Some("system") | None => Self::System,
            Some(other) => {
                tracing::warn!(value = %other, "unknown ROOT_MESSAGE_ROLE; using 'system'");
                Self::System
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub runtime: RuntimeTuning,
}

/// Filesystem locations used by the runtime.  All are overridable per layer;
/// relative paths resolve against the process working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned recursively for `*.yaml` agent configurations.
    pub agents_dir: PathBuf,
    /// Directory holding one YAML security policy per shell command.
    pub policies_dir: PathBuf,
    /// Base directory for per-session event logs.
    pub session_log_dir: PathBuf,
    /// Optional declarative tool-server configuration file.
    pub tool_servers: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            agents_dir: PathBuf::from("config/agents"),
            policies_dir: PathBuf::from("config/policies"),
            session_log_dir: PathBuf::from("logs/sessions"),
            tool_servers: None,
        }
    }
}

/// Process-wide runtime tuning injected into the chat loop at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeTuning {
    /// Ceiling for the exponential retry backoff, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Maximum in-flight provider calls per runtime instance.
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,
    /// Role used for the root (system prompt) message.
    #[serde(default)]
    pub root_message_role: RootMessageRole,
}

impl Default for RuntimeTuning {
    fn default() -> Self {
        Self {
            max_delay_secs: default_max_delay(),
            concurrency_limit: default_concurrency(),
            root_message_role: RootMessageRole::default(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_tuning_defaults() {
        let t = RuntimeTuning::default();
        assert_eq!(t.max_delay_secs, 120);
        assert_eq!(t.concurrency_limit, 3);
        assert_eq!(t.root_message_role, RootMessageRole::System);
    }

    #[test]
    fn root_role_parses_from_yaml() {
        let t: RuntimeTuning =
            serde_yaml::from_str("root_message_role: developer").unwrap();
        assert_eq!(t.root_message_role, RootMessageRole::Developer);
    }

    #[test]
    fn empty_config_deserializes_with_defaults() {
        let c: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(c.paths.agents_dir, PathBuf::from("config/agents"));
    }
}
