//! Match archive boundary.
//!
//! Durable records of finished matches are an external collaborator's
//! concern: the driver hands a [`MatchSummary`] to the configured
//! [`MatchArchive`] whenever a room reaches its terminal state and moves
//! on regardless of the outcome. Protocol state itself is in-memory only
//! and never depends on an archive write succeeding.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Snapshot of a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Room the match was played in.
    pub room_id: u128,
    /// Both participants, host first.
    pub participants: [u64; 2],
    /// Final `(user_id, score)` pairs, host first.
    pub scores: [(u64, u32); 2],
    /// Number of fully verified questions.
    pub questions_completed: u32,
    /// When the match ended, Unix milliseconds.
    pub ended_at_millis: u64,
}

/// Archive write failure.
///
/// Always non-fatal: the driver logs it and the protocol proceeds.
#[derive(Debug, thiserror::Error)]
#[error("archive write failed: {0}")]
pub struct ArchiveError(pub String);

/// Sink for finished-match records.
///
/// Implementations may write to a database, a log pipeline, or nothing at
/// all. Called synchronously from the driver, so implementations must not
/// block for unbounded time - queue internally if the backing store is
/// slow.
pub trait MatchArchive {
    /// Record one finished match.
    fn record(&self, summary: MatchSummary) -> Result<(), ArchiveError>;
}

/// In-memory archive.
///
/// Keeps summaries in a shared `Vec`, which is all the core needs for
/// development and tests. Clones share the same underlying store.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    inner: Arc<Mutex<Vec<MatchSummary>>>,
}

impl MemoryArchive {
    /// Create a new empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded summaries, in recording order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). Acceptable for an in-memory development store.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn records(&self) -> Vec<MatchSummary> {
        self.inner.lock().expect("mutex poisoned").clone()
    }

    /// Number of recorded matches.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("mutex poisoned").len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MatchArchive for MemoryArchive {
    #[allow(clippy::expect_used)]
    fn record(&self, summary: MatchSummary) -> Result<(), ArchiveError> {
        self.inner.lock().expect("mutex poisoned").push(summary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(room_id: u128) -> MatchSummary {
        MatchSummary {
            room_id,
            participants: [1, 2],
            scores: [(1, 3), (2, 1)],
            questions_completed: 5,
            ended_at_millis: 1_700_000_000_000,
        }
    }

    #[test]
    fn records_accumulate_in_order() {
        let archive = MemoryArchive::new();
        assert!(archive.is_empty());

        archive.record(summary(1)).unwrap();
        archive.record(summary(2)).unwrap();

        let records = archive.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].room_id, 1);
        assert_eq!(records[1].room_id, 2);
    }

    #[test]
    fn clones_share_the_store() {
        let archive = MemoryArchive::new();
        let clone = archive.clone();

        clone.record(summary(7)).unwrap();
        assert_eq!(archive.len(), 1);
    }
}
