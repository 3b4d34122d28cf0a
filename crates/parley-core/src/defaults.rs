// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parley_config::{RootMessageRole, RuntimeTuning};
use parley_model::{HeuristicTokenCounter, TokenCounter};

/// Process-wide runtime settings, resolved once at startup and injected.
///
/// Nothing in the chat loop reads the environment or process globals: the
/// host builds one of these (usually via [`RuntimeDefaults::from_tuning`])
/// and passes it down.  The token counter defaults to the chars/4
/// heuristic; hosts with a real tokenizer inject their own.
#[derive(Clone)]
pub struct RuntimeDefaults {
    pub root_message_role: RootMessageRole,
    /// Ceiling for exponential retry backoff.
    pub max_delay: Duration,
    /// Maximum in-flight provider calls per runtime instance.
    pub concurrency_limit: usize,
    pub token_counter: Arc<dyn TokenCounter>,
}

impl Default for RuntimeDefaults {
    fn default() -> Self {
        Self::from_tuning(&RuntimeTuning::default())
    }
}

impl RuntimeDefaults {
    pub fn from_tuning(tuning: &RuntimeTuning) -> Self {
        Self {
            root_message_role: tuning.root_message_role,
            max_delay: Duration::from_secs(tuning.max_delay_secs),
            concurrency_limit: tuning.concurrency_limit.max(1),
            token_counter: Arc::new(HeuristicTokenCounter),
        }
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = counter;
        self
    }

    /// Resolve from config with the environment override for the root role.
    /// Call once during process startup.
    pub fn from_tuning_and_env(tuning: &RuntimeTuning) -> Self {
        let mut defaults = Self::from_tuning(tuning);
        if std::env::var("ROOT_MESSAGE_ROLE").is_ok() {
            defaults.root_message_role = RootMessageRole::from_env();
        }
        defaults
    }
}

/// One-shot cooperative cancellation flag for a turn.
///
/// The bridge clears it at the start of `interact`; the client's cancel
/// request sets it; the runtime polls it between provider fragments and
/// between tool-call cycles.  A cancel observed after a stream has closed
/// is ignored by design.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuning_defaults() {
        let d = RuntimeDefaults::default();
        assert_eq!(d.max_delay, Duration::from_secs(120));
        assert_eq!(d.concurrency_limit, 3);
        assert_eq!(d.root_message_role, RootMessageRole::System);
    }

    #[test]
    fn concurrency_floor_is_one() {
        let tuning = RuntimeTuning {
            concurrency_limit: 0,
            ..RuntimeTuning::default()
        };
        assert_eq!(RuntimeDefaults::from_tuning(&tuning).concurrency_limit, 1);
    }

    #[test]
    fn cancel_flag_sets_and_clears() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        flag.clear();
        assert!(!flag.is_set());
    }

    #[test]
    fn cancel_flag_clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.set();
        assert!(flag.is_set());
    }
}
