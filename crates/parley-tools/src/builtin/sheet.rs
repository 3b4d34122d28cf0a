// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared-sheet toolset.
//!
//! Several agents may append to the same tabular target concurrently, so
//! every append first claims a disjoint row range from the
//! [`ConcurrencyManager`] and only then writes.  The default sheet name
//! comes from the session's tool-visible metadata when the caller does not
//! name one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::reservations::ConcurrencyManager;
use crate::toolset::{ToolContext, ToolDescriptor, Toolset};

const DEFAULT_SHEET: &str = "Sheet1";
/// Metameta prefix consulted for the session's working sheet.
const METAMETA_PREFIX: &str = "sheet";

pub struct SheetToolset {
    manager: Arc<ConcurrencyManager>,
    sheets: Mutex<HashMap<String, BTreeMap<u64, Vec<String>>>>,
}

impl SheetToolset {
    pub fn new(manager: Arc<ConcurrencyManager>) -> Self {
        Self {
            manager,
            sheets: Mutex::new(HashMap::new()),
        }
    }

    /// Sheet name: explicit argument, else the session's metameta view,
    /// else the default.
    fn resolve_sheet(args: &Value, ctx: &ToolContext) -> String {
        if let Some(name) = args.get("sheet").and_then(|v| v.as_str()) {
            return name.to_string();
        }
        ctx.metameta
            .get(METAMETA_PREFIX)
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|v| v.get("sheet").and_then(|s| s.as_str()).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_SHEET.to_string())
    }

    async fn append_rows(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<String> {
        let sheet = Self::resolve_sheet(&args, ctx);
        let rows: Vec<Vec<String>> = args
            .get("rows")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("missing 'rows'"))?
            .iter()
            .map(|row| {
                row.as_array()
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|c| match c {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect()
                    })
                    .ok_or_else(|| anyhow::anyhow!("each row must be an array of cells"))
            })
            .collect::<anyhow::Result<_>>()?;
        if rows.is_empty() {
            anyhow::bail!("'rows' must not be empty");
        }

        let current_max = {
            let sheets = self.sheets.lock().await;
            sheets
                .get(&sheet)
                .and_then(|s| s.keys().next_back().copied())
                .unwrap_or(0)
        };
        let reservation = self
            .manager
            .reserve_rows(rows.len() as u64, &sheet, current_max, &ctx.agent_key)
            .await;

        {
            let mut sheets = self.sheets.lock().await;
            let table = sheets.entry(sheet.clone()).or_default();
            for (offset, cells) in rows.into_iter().enumerate() {
                table.insert(reservation.start_row + offset as u64, cells);
            }
        }
        self.manager.commit(&reservation.reservation_id).await;

        Ok(format!(
            "appended rows {}-{} to {sheet}",
            reservation.start_row, reservation.end_row
        ))
    }

    async fn read_sheet(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<String> {
        let sheet = Self::resolve_sheet(&args, ctx);
        let sheets = self.sheets.lock().await;
        let Some(table) = sheets.get(&sheet) else {
            return Ok(format!("{sheet} is empty"));
        };
        let lines: Vec<String> = table
            .iter()
            .map(|(row, cells)| format!("{row}: {}", cells.join(" | ")))
            .collect();
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl Toolset for SheetToolset {
    fn name(&self) -> &str {
        "sheet"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "append_rows".into(),
                description: "Append rows to a shared sheet. Rows are written into a \
                              reserved range so concurrent writers never collide."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "sheet": { "type": "string", "description": "Sheet name (optional)" },
                        "rows": {
                            "type": "array",
                            "items": { "type": "array", "items": { "type": "string" } },
                            "description": "Rows to append, each an array of cells"
                        }
                    },
                    "required": ["rows"],
                    "additionalProperties": false
                }),
            },
            ToolDescriptor {
                name: "read_sheet".into(),
                description: "Read the rows of a shared sheet in row order.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "sheet": { "type": "string", "description": "Sheet name (optional)" }
                    },
                    "additionalProperties": false
                }),
            },
        ]
    }

    async fn call(&self, function: &str, args: Value, ctx: &ToolContext) -> anyhow::Result<String> {
        match function {
            "append_rows" => self.append_rows(args, ctx).await,
            "read_sheet" => self.read_sheet(args, ctx).await,
            other => anyhow::bail!("no function '{other}' on sheet"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
