// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Readers for session event logs.
//!
//! Log files are append-only and may end mid-line if the process died
//! during a write, so every reader tolerates a partial last line.  The
//! tail scan reads backwards in chunks (starting at 1 MB, enlarging on
//! miss) so "when did this session last speak" stays O(tail) even for
//! sessions with months of history; a linear scan is the fallback of last
//! resort.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Initial reverse-scan window.
const TAIL_CHUNK: u64 = 1024 * 1024;

/// One parsed log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event: Value,
}

/// Parse every complete record in a log file, skipping a torn final line.
pub fn read_records(path: &Path) -> anyhow::Result<Vec<EventRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut records = Vec::new();
    let line_count = text.lines().count();
    for (i, line) in text.lines().enumerate() {
        match serde_json::from_str::<EventRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) if i + 1 == line_count => {
                debug!(path = %path.display(), error = %e, "skipping torn final line");
            }
            Err(e) => {
                debug!(path = %path.display(), line = i + 1, error = %e, "skipping bad record");
            }
        }
    }
    Ok(records)
}

/// The last complete record of a file, found by chunked reverse read.
pub fn last_record(path: &Path) -> anyhow::Result<Option<EventRecord>> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut window = TAIL_CHUNK.min(len);
    loop {
        file.seek(SeekFrom::Start(len - window))?;
        let mut buf = Vec::with_capacity(window as usize);
        file.read_to_end(&mut buf)?;
        let text = String::from_utf8_lossy(&buf);

        // Scan candidate lines from the end.  When the window does not
        // start at the file head, the first line may be a fragment of a
        // record cut by the window boundary; parse failure covers that.
        for line in text.lines().rev() {
            if let Ok(record) = serde_json::from_str::<EventRecord>(line) {
                return Ok(Some(record));
            }
        }

        if window == len {
            break;
        }
        window = (window * 2).min(len);
    }

    // Linear fallback: the reverse scan found nothing parseable.
    Ok(read_records(path)?.into_iter().last())
}

/// Per-session summary cached next to the log files for O(1) listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub event_count: usize,
}

pub const METADATA_FILE: &str = "session_metadata.json";

/// Load the cached metadata for a session directory, rebuilding (and
/// rewriting) it from the JSONL files when the cache is missing or
/// invalid.
pub fn load_or_rebuild_metadata(session_dir: &Path) -> anyhow::Result<Option<SessionMetadata>> {
    let cache_path = session_dir.join(METADATA_FILE);
    if let Ok(text) = std::fs::read_to_string(&cache_path) {
        if let Ok(meta) = serde_json::from_str::<SessionMetadata>(&text) {
            return Ok(Some(meta));
        }
        debug!(path = %cache_path.display(), "invalid metadata cache, rebuilding");
    }

    let Some(meta) = scan_metadata(session_dir)? else {
        return Ok(None);
    };
    std::fs::write(&cache_path, serde_json::to_string_pretty(&meta)?)
        .with_context(|| format!("writing {}", cache_path.display()))?;
    Ok(Some(meta))
}

/// List every session under `base_dir` with its summary, newest activity
/// first.  Metadata caches are rebuilt as needed, so a cold listing costs
/// one scan and subsequent listings are O(sessions).
pub fn list_sessions(base_dir: &Path) -> anyhow::Result<Vec<(String, SessionMetadata)>> {
    let mut sessions = Vec::new();
    let entries = match std::fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(sessions),
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(session_id) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(meta) = load_or_rebuild_metadata(&path)? {
            sessions.push((session_id.to_string(), meta));
        }
    }
    sessions.sort_by(|a, b| b.1.end_time.cmp(&a.1.end_time));
    Ok(sessions)
}

/// Rescan every `events-*.jsonl` in the session directory.
fn scan_metadata(session_dir: &Path) -> anyhow::Result<Option<SessionMetadata>> {
    let mut paths: Vec<_> = std::fs::read_dir(session_dir)
        .with_context(|| format!("reading {}", session_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("events-") && n.ends_with(".jsonl"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut start: Option<DateTime<Utc>> = None;
    let mut end: Option<DateTime<Utc>> = None;
    let mut count = 0usize;
    for path in &paths {
        let records = read_records(path)?;
        count += records.len();
        if let Some(first) = records.first() {
            start = Some(match start {
                Some(s) => s.min(first.timestamp),
                None => first.timestamp,
            });
        }
        if let Some(last) = records.last() {
            end = Some(match end {
                Some(e) => e.max(last.timestamp),
                None => last.timestamp,
            });
        }
    }

    match (start, end) {
        (Some(start_time), Some(end_time)) => Ok(Some(SessionMetadata {
            start_time,
            end_time,
            duration_seconds: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
            event_count: count,
        })),
        _ => Ok(None),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record_line(seconds: i64, content: &str) -> String {
        let ts = DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap();
        format!(
            "{}\n",
            serde_json::json!({
                "timestamp": ts.to_rfc3339(),
                "event": { "session_id": "tiger-castle", "role": "assistant",
                           "type": "text_delta", "content": content },
            })
        )
    }

    fn write_log(dir: &Path, name: &str, lines: &[String]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            f.write_all(line.as_bytes()).unwrap();
        }
        path
    }

    // ── Record reading ────────────────────────────────────────────────────────

    #[test]
    fn reads_all_complete_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "events-20260801.jsonl",
            &[record_line(0, "a"), record_line(1, "b")],
        );
        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn torn_final_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = vec![record_line(0, "a")];
        lines.push("{\"timestamp\": \"2026-08-".to_string()); // torn write
        let path = write_log(dir.path(), "events-20260801.jsonl", &lines);
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    // ── Tail scan ─────────────────────────────────────────────────────────────

    #[test]
    fn last_record_finds_newest_complete_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines: Vec<String> = (0..100).map(|i| record_line(i, "x")).collect();
        lines.push("{\"torn".to_string());
        let path = write_log(dir.path(), "events-20260801.jsonl", &lines);
        let last = last_record(&path).unwrap().unwrap();
        assert_eq!(
            last.timestamp,
            DateTime::<Utc>::from_timestamp(1_700_000_099, 0).unwrap()
        );
    }

    #[test]
    fn last_record_of_empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "events-20260801.jsonl", &[]);
        assert!(last_record(&path).unwrap().is_none());
    }

    // ── Metadata cache ────────────────────────────────────────────────────────

    #[test]
    fn metadata_rebuilds_from_jsonl_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            dir.path(),
            "events-20260801.jsonl",
            &[record_line(0, "a"), record_line(30, "b")],
        );
        let meta = load_or_rebuild_metadata(dir.path()).unwrap().unwrap();
        assert_eq!(meta.event_count, 2);
        assert_eq!(meta.duration_seconds, 30.0);
        assert!(dir.path().join(METADATA_FILE).exists());
    }

    #[test]
    fn invalid_cache_triggers_rescan_and_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "events-20260801.jsonl", &[record_line(0, "a")]);
        std::fs::write(dir.path().join(METADATA_FILE), "not json").unwrap();
        let meta = load_or_rebuild_metadata(dir.path()).unwrap().unwrap();
        assert_eq!(meta.event_count, 1);
        let rewritten = std::fs::read_to_string(dir.path().join(METADATA_FILE)).unwrap();
        assert!(serde_json::from_str::<SessionMetadata>(&rewritten).is_ok());
    }

    #[test]
    fn list_sessions_sorts_by_latest_activity() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("amber-grove");
        let newer = dir.path().join("tiger-castle");
        std::fs::create_dir_all(&older).unwrap();
        std::fs::create_dir_all(&newer).unwrap();
        write_log(&older, "events-20260801.jsonl", &[record_line(0, "a")]);
        write_log(&newer, "events-20260801.jsonl", &[record_line(500, "b")]);

        let sessions = list_sessions(dir.path()).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].0, "tiger-castle");
        assert_eq!(sessions[1].0, "amber-grove");
    }

    #[test]
    fn list_sessions_of_missing_dir_is_empty() {
        assert!(list_sessions(Path::new("/nonexistent/logs")).unwrap().is_empty());
    }

    #[test]
    fn metadata_spans_multiple_day_files() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "events-20260731.jsonl", &[record_line(0, "a")]);
        write_log(dir.path(), "events-20260801.jsonl", &[record_line(86_400, "b")]);
        let meta = load_or_rebuild_metadata(dir.path()).unwrap().unwrap();
        assert_eq!(meta.event_count, 2);
        assert_eq!(meta.duration_seconds, 86_400.0);
    }
}
