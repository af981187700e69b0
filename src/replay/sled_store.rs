//! Durable replay log backed by `sled`.
//!
//! Fingerprints and committed-batch results live in separate trees but are
//! always written in the same transaction, so a crash between "fingerprint
//! recorded" and "batch id marked committed" cannot happen: either both
//! sides of a batch land, or neither does, and a retried `put_batch` with
//! the same batch id replays the cached result instead of re-deriving it
//! against a partially-updated fingerprint set.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};

use super::{in_batch_duplicates, BatchCommitResult, BlockHeight, Fingerprint, ReplayLog};
use crate::error::OnionError;

pub struct SledReplayLog {
    fingerprints: sled::Tree,
    batches: sled::Tree,
}

impl SledReplayLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OnionError> {
        let db = sled::open(path).map_err(io_err)?;
        let fingerprints = db.open_tree("replay_fingerprints").map_err(io_err)?;
        let batches = db.open_tree("replay_batches").map_err(io_err)?;
        Ok(Self {
            fingerprints,
            batches,
        })
    }

    fn height_bytes(height: BlockHeight) -> [u8; 4] {
        height.to_be_bytes()
    }
}

fn io_err(e: impl std::fmt::Display) -> OnionError {
    OnionError::LogIoFailure(e.to_string())
}

impl ReplayLog for SledReplayLog {
    fn start(&self) -> Result<(), OnionError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), OnionError> {
        self.fingerprints.flush().map_err(io_err)?;
        self.batches.flush().map_err(io_err)?;
        Ok(())
    }

    fn put(&self, fingerprint: Fingerprint, height: BlockHeight) -> Result<bool, OnionError> {
        match self
            .fingerprints
            .compare_and_swap(fingerprint, None as Option<&[u8]>, Some(&Self::height_bytes(height)))
            .map_err(io_err)?
        {
            Ok(()) => {
                self.fingerprints.flush().map_err(io_err)?;
                Ok(false)
            }
            Err(_) => Ok(true),
        }
    }

    fn put_batch(
        &self,
        batch_id: &[u8],
        entries: &[(Fingerprint, BlockHeight)],
    ) -> Result<BatchCommitResult, OnionError> {
        let in_batch = in_batch_duplicates(entries);

        let result = (&self.fingerprints, &self.batches)
            .transaction(|(fp_tx, batch_tx)| {
                if let Some(cached) = batch_tx.get(batch_id)? {
                    let decoded: BatchCommitResult = bincode::deserialize(&cached)
                        .map_err(|e| ConflictableTransactionError::Abort(e.to_string()))?;
                    return Ok(decoded);
                }

                let mut duplicates = in_batch.clone();
                for (i, (fp, height)) in entries.iter().enumerate() {
                    if duplicates.contains(&i) {
                        continue;
                    }
                    if fp_tx.get(fp)?.is_some() {
                        duplicates.insert(i);
                    } else {
                        fp_tx.insert(fp.as_slice(), &Self::height_bytes(*height))?;
                    }
                }

                let result = BatchCommitResult {
                    duplicate_positions: duplicates,
                };
                let encoded = bincode::serialize(&result)
                    .map_err(|e| ConflictableTransactionError::Abort(e.to_string()))?;
                batch_tx.insert(batch_id, encoded)?;
                Ok(result)
            })
            .map_err(|e: TransactionError<String>| io_err(e))?;

        self.fingerprints.flush().map_err(io_err)?;
        self.batches.flush().map_err(io_err)?;
        Ok(result)
    }

    fn gc(&self, horizon: BlockHeight) -> Result<(), OnionError> {
        for entry in self.fingerprints.iter() {
            let (key, value) = entry.map_err(io_err)?;
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&value);
            if BlockHeight::from_be_bytes(bytes) < horizon {
                self.fingerprints.remove(key).map_err(io_err)?;
            }
        }
        self.fingerprints.flush().map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fp(byte: u8) -> Fingerprint {
        [byte; 32]
    }

    #[test]
    fn put_reports_replay_on_second_insert() {
        let dir = tempdir().unwrap();
        let log = SledReplayLog::open(dir.path()).unwrap();
        assert!(!log.put(fp(1), 100).unwrap());
        assert!(log.put(fp(1), 200).unwrap());
    }

    #[test]
    fn put_batch_resolves_in_batch_and_cross_batch_duplicates() {
        let dir = tempdir().unwrap();
        let log = SledReplayLog::open(dir.path()).unwrap();
        let first = log.put_batch(b"batch-a", &[(fp(1), 10), (fp(1), 10)]).unwrap();
        assert_eq!(first.duplicate_positions, [1].into_iter().collect());

        let second = log
            .put_batch(b"batch-b", &[(fp(1), 10), (fp(2), 10)])
            .unwrap();
        assert_eq!(second.duplicate_positions, [0].into_iter().collect());
    }

    #[test]
    fn recommitting_same_batch_id_returns_cached_result() {
        let dir = tempdir().unwrap();
        let log = SledReplayLog::open(dir.path()).unwrap();
        let entries = [(fp(1), 10), (fp(2), 10)];
        let first = log.put_batch(b"batch-a", &entries).unwrap();
        let second = log.put_batch(b"batch-a", &entries).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let log = SledReplayLog::open(dir.path()).unwrap();
            log.put(fp(1), 100).unwrap();
            log.stop().unwrap();
        }
        let log = SledReplayLog::open(dir.path()).unwrap();
        assert!(log.put(fp(1), 100).unwrap());
    }
}
