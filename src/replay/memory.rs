//! In-memory replay log, backed by a mutex-guarded hash map. Suitable for
//! tests and for nodes that accept the loss of replay history on restart.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{in_batch_duplicates, BatchCommitResult, BlockHeight, Fingerprint, ReplayLog};
use crate::error::OnionError;

#[derive(Debug, Default)]
struct State {
    fingerprints: HashMap<Fingerprint, BlockHeight>,
    /// Remembers the result of each committed batch id, so retried commits
    /// after a crash (or a caller's at-least-once delivery) don't re-flag
    /// entries the first commit already resolved.
    committed_batches: HashMap<Vec<u8>, BatchCommitResult>,
}

#[derive(Debug, Default)]
pub struct MemoryReplayLog {
    state: Mutex<State>,
}

impl MemoryReplayLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayLog for MemoryReplayLog {
    fn start(&self) -> Result<(), OnionError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), OnionError> {
        Ok(())
    }

    fn put(&self, fingerprint: Fingerprint, height: BlockHeight) -> Result<bool, OnionError> {
        let mut state = self.state.lock();
        let replayed = state.fingerprints.contains_key(&fingerprint);
        state.fingerprints.entry(fingerprint).or_insert(height);
        Ok(replayed)
    }

    fn put_batch(
        &self,
        batch_id: &[u8],
        entries: &[(Fingerprint, BlockHeight)],
    ) -> Result<BatchCommitResult, OnionError> {
        let mut state = self.state.lock();
        if let Some(cached) = state.committed_batches.get(batch_id) {
            return Ok(cached.clone());
        }

        let mut duplicates = in_batch_duplicates(entries);
        for (i, (fp, height)) in entries.iter().enumerate() {
            if duplicates.contains(&i) {
                continue;
            }
            if state.fingerprints.contains_key(fp) {
                duplicates.insert(i);
            } else {
                state.fingerprints.insert(*fp, *height);
            }
        }

        let result = BatchCommitResult {
            duplicate_positions: duplicates,
        };
        state
            .committed_batches
            .insert(batch_id.to_vec(), result.clone());
        Ok(result)
    }

    fn gc(&self, horizon: BlockHeight) -> Result<(), OnionError> {
        let mut state = self.state.lock();
        state.fingerprints.retain(|_, h| *h >= horizon);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(byte: u8) -> Fingerprint {
        [byte; 32]
    }

    #[test]
    fn put_reports_replay_on_second_insert() {
        let log = MemoryReplayLog::new();
        assert!(!log.put(fp(1), 100).unwrap());
        assert!(log.put(fp(1), 200).unwrap());
    }

    #[test]
    fn in_batch_duplicates_keep_lowest_index() {
        let log = MemoryReplayLog::new();
        let entries = [(fp(1), 10), (fp(2), 10), (fp(1), 10)];
        let result = log.put_batch(b"batch-a", &entries).unwrap();
        assert_eq!(result.duplicate_positions, [2].into_iter().collect());
    }

    #[test]
    fn cross_batch_duplicate_detected() {
        let log = MemoryReplayLog::new();
        log.put_batch(b"batch-a", &[(fp(1), 10)]).unwrap();
        let result = log.put_batch(b"batch-b", &[(fp(1), 10), (fp(2), 10)]).unwrap();
        assert_eq!(result.duplicate_positions, [0].into_iter().collect());
    }

    #[test]
    fn recommitting_same_batch_id_is_idempotent() {
        let log = MemoryReplayLog::new();
        let entries = [(fp(1), 10), (fp(2), 10)];
        let first = log.put_batch(b"batch-a", &entries).unwrap();
        let second = log.put_batch(b"batch-a", &entries).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn gc_removes_entries_below_horizon() {
        let log = MemoryReplayLog::new();
        log.put(fp(1), 100).unwrap();
        log.put(fp(2), 200).unwrap();
        log.gc(200).unwrap();
        assert!(!log.put(fp(1), 100).unwrap(), "entry below horizon should be purged");
        assert!(log.put(fp(2), 200).unwrap(), "entry at horizon should survive");
    }
}
