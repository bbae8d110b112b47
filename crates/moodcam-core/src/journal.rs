//! Symptom / mood journal with best-effort AI enrichment.
//!
//! The collection is newest-first. Every mutation rewrites the whole
//! collection under [`STORAGE_KEY`]. After an entry is added, advice for it is
//! requested out of band; when it arrives it is attached to the entry with the
//! same id in whatever the collection holds at that moment, or dropped if that
//! entry is gone.

use crate::advice::AdviceService;
use crate::lock;
use crate::storage::{Storage, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinSet;

/// Key the collection is persisted under.
pub const STORAGE_KEY: &str = "symptomLogs";

#[derive(Error, Debug)]
pub enum JournalError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("malformed journal data: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize journal: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} {value:?} (expected one of: {expected})")]
pub struct ParseLevelError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
}

impl Mood {
    pub const ALL: [Mood; 6] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Sad,
        Mood::Angry,
        Mood::Surprised,
        Mood::Fearful,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Surprised => "surprised",
            Mood::Fearful => "fearful",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseLevelError {
                kind: "emotion",
                value: s.to_string(),
                expected: "neutral, happy, sad, angry, surprised, fearful",
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Mild, Severity::Moderate, Severity::Severe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseLevelError {
                kind: "severity",
                value: s.to_string(),
                expected: "mild, moderate, severe",
            })
    }
}

/// One journal entry. Only `advice` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomEntry {
    /// Creation time in epoch milliseconds, bumped to stay strictly increasing.
    pub id: i64,
    pub note: String,
    pub emotion: Mood,
    pub severity: Severity,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
}

struct Inner {
    entries: Mutex<Vec<SymptomEntry>>,
    storage: Arc<dyn Storage>,
    advisor: Arc<dyn AdviceService>,
}

impl Inner {
    fn persist(&self, entries: &[SymptomEntry]) -> Result<(), JournalError> {
        let json = serde_json::to_string(entries).map_err(JournalError::Serialize)?;
        self.storage.set(STORAGE_KEY, &json)?;
        Ok(())
    }

    async fn enrich(&self, entry: SymptomEntry) {
        match self.advisor.advise(&entry).await {
            Ok(advice) => {
                self.apply_advice(entry.id, advice);
            }
            Err(e) => tracing::warn!(id = entry.id, error = %e, "advice request failed"),
        }
    }

    fn apply_advice(&self, id: i64, advice: String) -> bool {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            tracing::debug!(id, "entry no longer present; advice dropped");
            return false;
        };
        if entry.advice.is_some() {
            return false;
        }
        entry.advice = Some(advice);
        if let Err(e) = self.persist(&entries) {
            tracing::warn!(id, error = %e, "failed to persist advice");
        }
        tracing::info!(id, "advice attached");
        true
    }
}

/// The journal: in-memory collection mirrored to storage.
pub struct SymptomLog {
    inner: Arc<Inner>,
    pending: tokio::sync::Mutex<JoinSet<()>>,
}

impl SymptomLog {
    /// Load the persisted collection. Absent, unreadable or malformed data
    /// yields an empty journal.
    pub fn load(storage: Arc<dyn Storage>, advisor: Arc<dyn AdviceService>) -> Self {
        let entries = match storage.get(STORAGE_KEY) {
            Ok(Some(raw)) => match parse_entries(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable journal");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "journal storage unreadable; starting empty");
                Vec::new()
            }
        };
        tracing::debug!(entries = entries.len(), "journal loaded");

        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(entries),
                storage,
                advisor,
            }),
            pending: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    /// Snapshot of the collection, newest first.
    pub fn entries(&self) -> Vec<SymptomEntry> {
        lock(&self.inner.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a new entry and request advice for it in the background.
    ///
    /// An empty note records nothing and returns `Ok(None)`. If the write
    /// fails the entry is not kept.
    ///
    /// The write happens synchronously under the collection lock so the
    /// stored collection always matches memory; with [`FileStorage`] that is
    /// one small fsync on the calling worker.
    ///
    /// [`FileStorage`]: crate::storage::FileStorage
    pub async fn add_entry(
        &self,
        note: &str,
        emotion: Mood,
        severity: Severity,
    ) -> Result<Option<SymptomEntry>, JournalError> {
        if note.is_empty() {
            return Ok(None);
        }

        let entry = {
            let mut entries = lock(&self.inner.entries);
            let time = Utc::now();
            let mut id = time.timestamp_millis();
            if let Some(newest) = entries.iter().map(|e| e.id).max() {
                if id <= newest {
                    id = newest + 1;
                }
            }
            let entry = SymptomEntry {
                id,
                note: note.to_string(),
                emotion,
                severity,
                time,
                advice: None,
            };
            entries.insert(0, entry.clone());
            if let Err(e) = self.inner.persist(&entries) {
                entries.remove(0);
                return Err(e);
            }
            entry
        };
        tracing::info!(id = entry.id, emotion = %emotion, severity = %severity, "journal entry added");

        let inner = Arc::clone(&self.inner);
        let payload = entry.clone();
        let mut pending = self.pending.lock().await;
        while let Some(res) = pending.try_join_next() {
            if let Err(e) = res {
                tracing::warn!(error = %e, "advice task did not complete");
            }
        }
        pending.spawn(async move { inner.enrich(payload).await });

        Ok(Some(entry))
    }

    /// Empty the journal and persist immediately.
    pub fn clear_all(&self) -> Result<(), JournalError> {
        let mut entries = lock(&self.inner.entries);
        let previous = std::mem::take(&mut *entries);
        if let Err(e) = self.inner.persist(&entries) {
            *entries = previous;
            return Err(e);
        }
        tracing::info!(removed = previous.len(), "journal cleared");
        Ok(())
    }

    /// Wait for every outstanding advice request to finish.
    pub async fn settle(&self) {
        let mut pending = self.pending.lock().await;
        while let Some(res) = pending.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, "advice task did not complete");
            }
        }
    }
}

fn parse_entries(raw: &str) -> Result<Vec<SymptomEntry>, JournalError> {
    // A stored `null` reads as an empty journal.
    let parsed: Option<Vec<SymptomEntry>> =
        serde_json::from_str(raw).map_err(JournalError::Parse)?;
    Ok(parsed.unwrap_or_default())
}
