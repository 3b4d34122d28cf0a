// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Mnemonic slug identifiers.
//!
//! Session ids, interaction ids, and configuration uids are all short
//! word slugs (`tiger-castle`) rather than GUIDs: they are easy to read
//! aloud, easy to grep in logs, and survive copy/paste without truncation.
//! Two-word slugs identify sessions; three-word slugs are used where the
//! collision surface is larger (interaction ids, config uids).

use rand::Rng;
use sha2::{Digest, Sha256};

/// Word list for slug generation.  All entries are lowercase ASCII letters
/// only, so any generated slug matches [`MnemonicSlug::SESSION_ID_PATTERN`].
const WORDS: &[&str] = &[
    "acorn", "amber", "anchor", "apple", "arrow", "aspen", "badger", "bamboo",
    "banana", "basil", "beacon", "bear", "birch", "bison", "breeze", "brook",
    "butter", "camel", "candle", "canyon", "castle", "cedar", "cherry", "cliff",
    "clover", "cobalt", "comet", "copper", "coral", "cotton", "crane", "creek",
    "cricket", "crystal", "dawn", "delta", "desert", "dolphin", "drift", "eagle",
    "ember", "falcon", "fern", "flint", "forest", "fox", "garnet", "ginger",
    "glacier", "grove", "harbor", "hawk", "hazel", "heron", "hollow", "ivory",
    "jade", "jasper", "juniper", "koala", "lagoon", "lantern", "laurel", "lemon",
    "linen", "lotus", "lunar", "maple", "marble", "meadow", "mesa", "mint",
    "mirror", "monarch", "moss", "nectar", "nickel", "north", "oak", "ocean",
    "olive", "onyx", "opal", "orchid", "osprey", "otter", "panda", "pebble",
    "penguin", "pepper", "pine", "plum", "pond", "poppy", "prairie", "quartz",
    "quill", "raven", "reef", "ridge", "river", "robin", "rose", "rowan",
    "ruby", "saffron", "sage", "salmon", "sandal", "sapphire", "shadow", "shell",
    "sierra", "silver", "sparrow", "spruce", "stone", "storm", "summit", "sunset",
    "tansy", "thistle", "tiger", "timber", "topaz", "trout", "tulip", "tundra",
    "velvet", "violet", "walnut", "willow", "winter", "wolf", "wren", "zephyr",
];

/// Generator and validator for mnemonic word slugs.
pub struct MnemonicSlug;

impl MnemonicSlug {
    /// The shape every session id must have: exactly two lowercase words
    /// joined by a single hyphen.  GUIDs, numbers, and multi-hyphen strings
    /// all fail this pattern.
    pub const SESSION_ID_PATTERN: &'static str = "^[a-z]+-[a-z]+$";

    /// Generate a random slug of `words` words.
    pub fn generate(words: usize) -> String {
        let mut rng = rand::thread_rng();
        let picked: Vec<&str> = (0..words.max(1))
            .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
            .collect();
        picked.join("-")
    }

    /// Generate a random two-word session id.
    pub fn generate_session_id() -> String {
        Self::generate(2)
    }

    /// Derive a deterministic slug of `words` words from `seed`.
    ///
    /// The same seed text always yields the same slug: configuration uids
    /// synthesized from file contents stay stable across reloads as long as
    /// the file is unchanged.
    pub fn from_seed(words: usize, seed: &str) -> String {
        let digest = Sha256::digest(seed.as_bytes());
        let picked: Vec<&str> = (0..words.max(1))
            .map(|i| {
                // Two digest bytes per word; 32 bytes covers up to 16 words.
                let hi = digest[(2 * i) % digest.len()] as usize;
                let lo = digest[(2 * i + 1) % digest.len()] as usize;
                WORDS[(hi << 8 | lo) % WORDS.len()]
            })
            .collect();
        picked.join("-")
    }

    /// True when `id` is a valid two-word session id.
    pub fn is_valid_session_id(id: &str) -> bool {
        let mut parts = id.split('-');
        let (Some(first), Some(second), None) = (parts.next(), parts.next(), parts.next()) else {
            return false;
        };
        !first.is_empty()
            && !second.is_empty()
            && first.bytes().all(|b| b.is_ascii_lowercase())
            && second.bytes().all(|b| b.is_ascii_lowercase())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Generation ───────────────────────────────────────────────────────────

    #[test]
    fn generated_session_id_is_valid() {
        for _ in 0..50 {
            let id = MnemonicSlug::generate_session_id();
            assert!(MnemonicSlug::is_valid_session_id(&id), "bad id: {id}");
        }
    }

    #[test]
    fn generate_respects_word_count() {
        let slug = MnemonicSlug::generate(3);
        assert_eq!(slug.split('-').count(), 3);
    }

    #[test]
    fn generate_zero_words_yields_one_word() {
        let slug = MnemonicSlug::generate(0);
        assert_eq!(slug.split('-').count(), 1);
    }

    // ── Seeded slugs ─────────────────────────────────────────────────────────

    #[test]
    fn from_seed_is_deterministic() {
        let a = MnemonicSlug::from_seed(3, "name: My Agent\npersona: hello");
        let b = MnemonicSlug::from_seed(3, "name: My Agent\npersona: hello");
        assert_eq!(a, b);
    }

    #[test]
    fn from_seed_differs_for_different_seeds() {
        let a = MnemonicSlug::from_seed(3, "agent one");
        let b = MnemonicSlug::from_seed(3, "agent two");
        assert_ne!(a, b);
    }

    #[test]
    fn from_seed_word_count() {
        assert_eq!(MnemonicSlug::from_seed(3, "seed").split('-').count(), 3);
    }

    // ── Validation ───────────────────────────────────────────────────────────

    #[test]
    fn valid_ids_accepted() {
        for id in ["tiger-castle", "apple-banana", "hello-world"] {
            assert!(MnemonicSlug::is_valid_session_id(id));
        }
    }

    #[test]
    fn guid_rejected() {
        assert!(!MnemonicSlug::is_valid_session_id(
            "550e8400-e29b-41d4-a716-446655440000"
        ));
    }

    #[test]
    fn invalid_shapes_rejected() {
        for id in ["", "single", "Upper-case", "two-words-three", "with-1digit", "tr ailing-space"] {
            assert!(!MnemonicSlug::is_valid_session_id(id), "accepted: {id:?}");
        }
    }
}
