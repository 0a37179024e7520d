//! The replicated word tracker.
//!
//! A single lock guards the ranked buffer together with the index of the last log entry applied
//! to it, so readers always see a buffer and the index it reflects as one consistent pair.
//! The raft state machine store drives `apply`, `snapshot` and `restore`; the gRPC service only
//! reads.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    snapshot::WordsSnapshot,
    words::{DecodeError, Words},
};

#[derive(Debug, Default)]
struct TrackerInner {
    words: Words,
    applied_index: u64,
    // Cleared by a failed restore; reads are refused until a restore succeeds.
    ready: bool,
}

#[derive(Debug)]
pub struct WordTracker {
    inner: Mutex<TrackerInner>,
}

/// A consistent read of the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadView {
    pub read_at_index: u64,
    pub best_words: Words,
}

impl Default for WordTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl WordTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                ready: true,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the word committed at `index`. Returns whether the buffer changed.
    pub fn apply(&self, index: u64, word: &str) -> bool {
        let mut inner = self.lock();
        let changed = inner.words.insert(word);
        inner.applied_index = index;
        changed
    }

    /// Record a committed entry that carries no word (leader blanks, membership).
    pub fn advance(&self, index: u64) {
        self.lock().applied_index = index;
    }

    pub fn snapshot(&self) -> WordsSnapshot {
        let inner = self.lock();
        WordsSnapshot::new(inner.applied_index, inner.words.clone())
    }

    /// Replace the whole buffer with the decoded `payload`, as of `applied_index`.
    ///
    /// On a decode failure the buffer is left as it was and the tracker stops serving reads.
    pub fn restore(&self, applied_index: u64, payload: &[u8]) -> Result<(), DecodeError> {
        let decoded = Words::decode(payload);
        let mut inner = self.lock();
        match decoded {
            Ok(words) => {
                inner.words = words;
                inner.applied_index = applied_index;
                inner.ready = true;
                Ok(())
            }
            Err(err) => {
                inner.ready = false;
                Err(err)
            }
        }
    }

    pub fn read(&self) -> Result<ReadView, NotReady> {
        let inner = self.lock();
        if !inner.ready {
            return Err(NotReady);
        }
        Ok(ReadView {
            read_at_index: inner.applied_index,
            best_words: inner.words.clone(),
        })
    }

    pub fn applied_index(&self) -> u64 {
        self.lock().applied_index
    }
}

/// The last restore failed; the tracker holds no trustworthy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotReady;

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "word tracker is waiting for a valid snapshot")
    }
}

impl std::error::Error for NotReady {}
