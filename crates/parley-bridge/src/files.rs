// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! File upload seam.
//!
//! Upload handling and blob storage are external collaborators.  The
//! bridge only resolves ids into [`MediaInput`]s it can partition and hand
//! to the runtime.

use std::collections::HashMap;

use async_trait::async_trait;

use parley_model::MediaInput;

#[async_trait]
pub trait FileHandler: Send + Sync {
    /// Resolve one uploaded file for use in a turn.
    async fn fetch(&self, file_id: &str, session_id: &str) -> anyhow::Result<MediaInput>;
}

/// Fixed-map handler for tests.
#[derive(Default)]
pub struct StaticFileHandler {
    files: HashMap<String, MediaInput>,
}

impl StaticFileHandler {
    pub fn with_files(files: Vec<MediaInput>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|f| (f.file_id.clone(), f))
                .collect(),
        }
    }
}

#[async_trait]
impl FileHandler for StaticFileHandler {
    async fn fetch(&self, file_id: &str, _session_id: &str) -> anyhow::Result<MediaInput> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown file id '{file_id}'"))
    }
}
