//! Structured-log reader -- Windows Event Log (`.evtx`) tailing.
//!
//! Records are ordered by `(timestamp, record id)`; a record without a
//! usable timestamp, or a checkpoint without one, falls back to comparing
//! ids alone. Each poll re-opens the file and returns only the most recent
//! `limit` records.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use evtx::EvtxParser;

use loglens_core::pipeline::BoxFuture;
use loglens_core::types::Checkpoint;

use crate::error::AgentError;

/// One event log record rendered as XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub xml: String,
}

impl EventRecord {
    /// Whether this record comes after the given position.
    pub fn is_after(&self, last_id: u64, last_timestamp: Option<DateTime<Utc>>) -> bool {
        match (self.timestamp, last_timestamp) {
            (Some(ts), Some(last)) => (ts, self.id) > (last, last_id),
            _ => self.id > last_id,
        }
    }

    /// Checkpoint pointing at this record.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::EventLog {
            last_id: self.id,
            last_timestamp: self.timestamp,
        }
    }
}

/// Sorts records oldest first.
pub fn sort_records(records: &mut [EventRecord]) {
    records.sort_by_key(|r| (r.timestamp, r.id));
}

/// Latest record of a window, the starting point of a first run.
pub fn latest_position(records: &[EventRecord]) -> Checkpoint {
    records
        .iter()
        .max_by_key(|r| (r.timestamp, r.id))
        .map(EventRecord::checkpoint)
        .unwrap_or(Checkpoint::EventLog {
            last_id: 0,
            last_timestamp: None,
        })
}

/// Source of structured-log records.
pub trait EventLogReader: Send + Sync {
    /// Most recent `limit` records of `path`, oldest first.
    fn tail<'a>(
        &'a self,
        path: &'a Path,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<EventRecord>, AgentError>>;
}

/// Reads `.evtx` files with the `evtx` parser on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvtxFileReader;

impl EvtxFileReader {
    fn read_tail(path: PathBuf, limit: usize) -> Result<Vec<EventRecord>, AgentError> {
        let mut parser = EvtxParser::from_path(&path)
            .map_err(|e| AgentError::read_failed(path.display(), e))?;

        let mut window: VecDeque<EventRecord> = VecDeque::with_capacity(limit.min(4096));
        let mut skipped = 0_u64;

        for record in parser.records() {
            match record {
                Ok(record) => {
                    if window.len() == limit {
                        window.pop_front();
                    }
                    window.push_back(EventRecord {
                        id: record.event_record_id,
                        timestamp: Some(record.timestamp),
                        xml: record.data,
                    });
                }
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::debug!(path = %path.display(), skipped, "skipped unreadable event records");
        }

        let mut records: Vec<EventRecord> = window.into();
        sort_records(&mut records);
        Ok(records)
    }
}

impl EventLogReader for EvtxFileReader {
    fn tail<'a>(
        &'a self,
        path: &'a Path,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<EventRecord>, AgentError>> {
        let owned = path.to_path_buf();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::read_tail(owned, limit.max(1)))
                .await
                .map_err(|e| AgentError::read_failed(path.display(), format!("reader task failed: {e}")))?
        })
    }
}
