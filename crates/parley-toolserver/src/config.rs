// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Declarative configuration for external tool servers.
//!
//! A configuration file names each server and how to reach it: a stdio
//! child process (`command` + `args` + `env`) or a streaming HTTP endpoint
//! (`url` + `headers` + `timeout`).  String values may reference
//! environment variables as `${VAR}` or `$VAR`; unresolved references stay
//! verbatim so a missing variable is visible in logs instead of silently
//! becoming an empty string.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Stdio,
    Sse,
}

/// Configuration for one tool server.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolServerConfig {
    pub transport_type: TransportType,

    // stdio transport
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,

    // streaming HTTP transport
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

/// Full tool-server configuration: the server map plus the tool allow-list.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolServersConfig {
    #[serde(default)]
    pub servers: HashMap<String, ToolServerConfig>,
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_allow_all() -> Vec<String> {
    vec!["*".to_string()]
}

/// Glob allow-list over fully-qualified tool names (`server-tool`).
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_allow_all")]
    pub allowed_tools: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_tools: default_allow_all(),
        }
    }
}

impl SecurityConfig {
    /// True when the fully-qualified tool name matches any allow pattern.
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        self.allowed_tools.iter().any(|pattern| {
            glob_to_regex(pattern)
                .map(|re| re.is_match(tool_name))
                .unwrap_or(false)
        })
    }
}

/// Convert a simple glob (`*` matches anything, `?` one char) to an anchored
/// regex.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

impl ToolServersConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(text).context("parsing tool-server configuration")?;
        resolve_env_in_value(&mut value);
        Ok(serde_yaml::from_value(value).context("invalid tool-server configuration")?)
    }
}

/// Resolve `${VAR}` and `$VAR` references in every string of a YAML tree.
fn resolve_env_in_value(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(s) => *s = resolve_env_vars(s),
        serde_yaml::Value::Mapping(m) => {
            for (_, v) in m.iter_mut() {
                resolve_env_in_value(v);
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                resolve_env_in_value(v);
            }
        }
        _ => {}
    }
}

fn resolve_env_vars(value: &str) -> String {
    let braced = Regex::new(r"\$\{([^}]+)\}").expect("static pattern");
    let bare = Regex::new(r"\$([a-zA-Z0-9_]+)").expect("static pattern");

    let step = braced.replace_all(value, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| format!("${{{}}}", &caps[1]))
    });
    bare.replace_all(&step, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| format!("${}", &caps[1]))
    })
    .into_owned()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
servers:
  notes:
    transport_type: stdio
    command: notes-server
    args: [\"--root\", \"/tmp/notes\"]
    env:
      NOTES_TOKEN: \"${PARLEY_TEST_TOKEN}\"
  search:
    transport_type: sse
    url: https://tools.example.com/rpc
    headers:
      Authorization: \"Bearer $PARLEY_TEST_TOKEN\"
    timeout: 15
security:
  allowed_tools:
    - \"notes-*\"
    - \"search-query\"
";

    #[test]
    fn parses_both_transports() {
        let cfg = ToolServersConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.servers["notes"].transport_type, TransportType::Stdio);
        assert_eq!(cfg.servers["search"].transport_type, TransportType::Sse);
        assert_eq!(cfg.servers["search"].timeout, Some(15.0));
    }

    #[test]
    fn env_vars_resolve_when_set() {
        std::env::set_var("PARLEY_TEST_TOKEN", "sekrit");
        let cfg = ToolServersConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.servers["notes"].env["NOTES_TOKEN"], "sekrit");
        assert_eq!(
            cfg.servers["search"].headers["Authorization"],
            "Bearer sekrit"
        );
        std::env::remove_var("PARLEY_TEST_TOKEN");
    }

    #[test]
    fn unresolved_vars_stay_verbatim() {
        assert_eq!(resolve_env_vars("${PARLEY_NO_SUCH_VAR}"), "${PARLEY_NO_SUCH_VAR}");
        assert_eq!(resolve_env_vars("$PARLEY_NO_SUCH_VAR"), "$PARLEY_NO_SUCH_VAR");
    }

    // ── Allow-list ────────────────────────────────────────────────────────────

    #[test]
    fn allow_list_matches_globs() {
        let cfg = ToolServersConfig::from_yaml(SAMPLE).unwrap();
        assert!(cfg.security.is_tool_allowed("notes-create"));
        assert!(cfg.security.is_tool_allowed("search-query"));
        assert!(!cfg.security.is_tool_allowed("search-delete"));
    }

    #[test]
    fn default_security_allows_everything() {
        let sec = SecurityConfig::default();
        assert!(sec.is_tool_allowed("anything-at-all"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let sec = SecurityConfig {
            allowed_tools: vec!["db-v?".into()],
        };
        assert!(sec.is_tool_allowed("db-v1"));
        assert!(!sec.is_tool_allowed("db-v12"));
    }
}
