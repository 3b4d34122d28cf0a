// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Security policies for tools that execute external commands.
//!
//! One YAML file per command, keyed by file stem.  A policy declares which
//! flags the command may receive, which subcommands are allowed (each with
//! its own flag table), and the default timeout.  A file whose schema does
//! not build is skipped with a warning — the command tool stays usable for
//! every policy that loaded cleanly.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Allowed flags: either a plain list (`["-l", "-a"]`) or a mapping of
/// flag → constraint.  Constraints are opaque to the validator today; the
/// mapping form exists so policies can annotate flags without a schema
/// change.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlagSpec {
    List(Vec<String>),
    Map(HashMap<String, serde_yaml::Value>),
}

impl FlagSpec {
    fn allows(&self, flag: &str) -> bool {
        // A flag with an attached value (`--depth=3`) matches on its name.
        let bare = flag.split('=').next().unwrap_or(flag);
        match self {
            Self::List(flags) => flags.iter().any(|f| f == bare),
            Self::Map(flags) => flags.contains_key(bare),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawSubcommand {
    #[serde(default)]
    flags: Option<FlagSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPolicy {
    #[serde(default)]
    flags: Option<FlagSpec>,
    #[serde(default)]
    subcommands: Option<HashMap<String, RawSubcommand>>,
    #[serde(default)]
    default_timeout: Option<u64>,
}

/// Validated policy for one command.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    pub command: String,
    flags: Option<FlagSpec>,
    subcommands: HashMap<String, Option<FlagSpec>>,
    pub default_timeout: Duration,
}

impl CommandPolicy {
    fn from_raw(command: &str, raw: RawPolicy) -> Self {
        Self {
            command: command.to_string(),
            flags: raw.flags,
            subcommands: raw
                .subcommands
                .unwrap_or_default()
                .into_iter()
                .map(|(name, sub)| (name, sub.flags))
                .collect(),
            default_timeout: Duration::from_secs(
                raw.default_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }

    /// Validate an argument vector (everything after the command itself).
    ///
    /// When the first non-flag token names a configured subcommand, the
    /// subcommand's flag table governs; otherwise the top-level table does.
    pub fn validate(&self, args: &[String]) -> Result<(), String> {
        let mut table = &self.flags;
        let mut rest = args;

        if let Some(first) = args.first() {
            if !first.starts_with('-') {
                match self.subcommands.get(first.as_str()) {
                    Some(sub_flags) => {
                        table = sub_flags;
                        rest = &args[1..];
                    }
                    None if !self.subcommands.is_empty() => {
                        return Err(format!(
                            "subcommand '{first}' is not allowed for {}",
                            self.command
                        ));
                    }
                    None => {}
                }
            }
        }

        for arg in rest {
            if !arg.starts_with('-') {
                continue;
            }
            let allowed = match table {
                Some(spec) => spec.allows(arg),
                // No flag table configured means no flags are allowed.
                None => false,
            };
            if !allowed {
                return Err(format!("flag '{arg}' is not allowed for {}", self.command));
            }
        }
        Ok(())
    }
}

/// All policies loaded from a directory.
#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: HashMap<String, CommandPolicy>,
}

impl PolicyStore {
    /// Load every `*.yaml` policy in `dir`.  Unreadable or malformed files
    /// are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Self {
        let mut policies = HashMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot read policy directory");
                return Self::default();
            }
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|x| x.to_str()) != Some("yaml") {
                continue;
            }
            let Some(command) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable policy");
                    continue;
                }
            };
            match serde_yaml::from_str::<RawPolicy>(&text) {
                Ok(raw) => {
                    policies.insert(command.to_string(), CommandPolicy::from_raw(command, raw));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping invalid policy");
                }
            }
        }
        Self { policies }
    }

    pub fn get(&self, command: &str) -> Option<&CommandPolicy> {
        self.policies.get(command)
    }

    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        names.sort();
        names
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store_from(files: &[(&str, &str)]) -> PolicyStore {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        PolicyStore::load_dir(dir.path())
    }

    // ── Loading ───────────────────────────────────────────────────────────────

    #[test]
    fn loads_list_flag_policy() {
        let store = store_from(&[("ls.yaml", "flags: [\"-l\", \"-a\"]\ndefault_timeout: 5\n")]);
        let p = store.get("ls").unwrap();
        assert_eq!(p.default_timeout, Duration::from_secs(5));
        assert!(p.validate(&["-l".into()]).is_ok());
        assert!(p.validate(&["-R".into()]).is_err());
    }

    #[test]
    fn loads_map_flag_policy() {
        let store = store_from(&[(
            "grep.yaml",
            "flags:\n  \"-n\": {}\n  \"--max-count\": { type: int }\n",
        )]);
        let p = store.get("grep").unwrap();
        assert!(p.validate(&["-n".into()]).is_ok());
        assert!(p.validate(&["--max-count=3".into()]).is_ok());
        assert!(p.validate(&["-r".into()]).is_err());
    }

    #[test]
    fn invalid_policy_is_skipped_with_rest_usable() {
        let store = store_from(&[
            ("bad.yaml", "flags: 17\n"),
            ("ls.yaml", "flags: [\"-l\"]\n"),
        ]);
        assert!(store.get("bad").is_none());
        assert!(store.get("ls").is_some());
        assert_eq!(store.commands(), vec!["ls"]);
    }

    #[test]
    fn missing_directory_yields_empty_store() {
        let store = PolicyStore::load_dir(Path::new("/nonexistent/policies"));
        assert!(store.commands().is_empty());
    }

    // ── Subcommands ───────────────────────────────────────────────────────────

    #[test]
    fn subcommand_uses_own_flag_table() {
        let store = store_from(&[(
            "git.yaml",
            "subcommands:\n  status:\n    flags: [\"--short\"]\n  log:\n    flags: [\"--oneline\", \"-n\"]\n",
        )]);
        let p = store.get("git").unwrap();
        assert!(p.validate(&["status".into(), "--short".into()]).is_ok());
        assert!(p.validate(&["log".into(), "--oneline".into()]).is_ok());
        assert!(p.validate(&["status".into(), "--oneline".into()]).is_err());
    }

    #[test]
    fn unlisted_subcommand_rejected() {
        let store = store_from(&[("git.yaml", "subcommands:\n  status: {}\n")]);
        let p = store.get("git").unwrap();
        assert!(p.validate(&["push".into()]).is_err());
    }

    #[test]
    fn default_timeout_applies_when_missing() {
        let store = store_from(&[("cat.yaml", "flags: []\n")]);
        assert_eq!(store.get("cat").unwrap().default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn no_flag_table_means_no_flags() {
        let store = store_from(&[("echo.yaml", "{}\n")]);
        let p = store.get("echo").unwrap();
        assert!(p.validate(&["hello".into()]).is_ok());
        assert!(p.validate(&["-e".into()]).is_err());
    }
}
