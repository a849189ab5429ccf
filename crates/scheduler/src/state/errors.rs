//! Per-job error history keyed by error site.

use std::collections::HashMap;

use cadence_core::TracedError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Maximum number of distinct error sites kept per job.
pub const MAX_DISTINCT_ERRORS: usize = 128;

/// One distinct error site with its occurrence count.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Stable identity of site + message.
    pub id: u64,
    /// `file:line:column` where the error was produced.
    pub site: String,
    /// Message produced at this site.
    pub message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: u64,
    /// Backtrace captured when the error came from a recovered panic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
}

/// Distinct errors seen by a job. Repeats bump a counter instead of adding
/// entries, so memory is bounded by the number of error sites.
#[derive(Debug, Default)]
pub struct ErrorDirectory {
    entries: Mutex<HashMap<u64, ErrorRecord>>,
}

impl ErrorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `error`. Returns the occurrence count for its site.
    pub fn record(&self, error: &TracedError) -> u64 {
        self.record_at(error, Utc::now())
    }

    pub(crate) fn record_at(&self, error: &TracedError, at: DateTime<Utc>) -> u64 {
        let id = error.id();
        let mut entries = self.entries.lock();

        if let Some(existing) = entries.get_mut(&id) {
            existing.count += 1;
            existing.last_seen = at;
            return existing.count;
        }

        if entries.len() >= MAX_DISTINCT_ERRORS {
            // Evict the site that has been quiet the longest.
            if let Some(stale) = entries
                .values()
                .min_by_key(|record| record.last_seen)
                .map(|record| record.id)
            {
                entries.remove(&stale);
            }
        }

        entries.insert(
            id,
            ErrorRecord {
                id,
                site: error.site(),
                message: error.message().to_string(),
                first_seen: at,
                last_seen: at,
                count: 1,
                backtrace: error.backtrace().map(str::to_string),
            },
        );
        1
    }

    /// Number of distinct error sites.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Look up a site by its stable id.
    pub fn get(&self, id: u64) -> Option<ErrorRecord> {
        self.entries.lock().get(&id).cloned()
    }

    /// All records, most recently seen first.
    pub fn entries(&self) -> Vec<ErrorRecord> {
        let mut out: Vec<ErrorRecord> = self.entries.lock().values().cloned().collect();
        out.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(b.count.cmp(&a.count)));
        out
    }
}
