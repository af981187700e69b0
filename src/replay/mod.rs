//! C7: replay protection.
//!
//! Every onion packet carries a per-hop shared secret that is unique to that
//! sender/session pair; a hop that sees the same shared secret twice is
//! looking at a replayed packet (or a packet deliberately crafted to share
//! one). The replay log tracks fingerprints of shared secrets this node has
//! already processed, keyed by the block height at which they were first
//! seen so old entries can be garbage-collected once their CLTV has surely
//! expired.

mod memory;
mod sled_store;

use std::collections::BTreeSet;

use crate::error::OnionError;
use crate::keys::sha256;

pub use memory::MemoryReplayLog;
pub use sled_store::SledReplayLog;

/// The replay fingerprint is the shared secret's hash, not the shared secret
/// itself, so the log never holds key material a compromised disk could
/// reuse to decrypt traffic.
pub type Fingerprint = [u8; 32];
pub type BlockHeight = u32;

pub fn fingerprint_of(shared_secret: &[u8; 32]) -> Fingerprint {
    sha256(shared_secret)
}

/// Outcome of committing a batch: the positions (indices into the batch, in
/// the order passed to [`ReplayLog::put_batch`]) that turned out to be
/// duplicates, either of each other or of an entry already on disk. The
/// lowest-indexed occurrence of any duplicated fingerprint is never listed —
/// it's treated as the "first" sighting and wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BatchCommitResult {
    pub duplicate_positions: BTreeSet<usize>,
}

/// Persistence backend for replay fingerprints.
///
/// Implementations must be safe to share across threads: [`crate::router::Router`]
/// holds one behind an `Arc` and calls into it from every packet-processing
/// call site.
pub trait ReplayLog: Send + Sync {
    /// Prepare the log for use (open files, spawn background compaction,
    /// etc). Called once by the router at construction time.
    fn start(&self) -> Result<(), OnionError>;

    /// Release any resources acquired by `start`.
    fn stop(&self) -> Result<(), OnionError>;

    /// Record a single fingerprint seen outside of a batch. Returns `true`
    /// if the fingerprint was already present (a replay).
    fn put(&self, fingerprint: Fingerprint, height: BlockHeight) -> Result<bool, OnionError>;

    /// Commit an entire batch atomically and idempotently under `batch_id`:
    /// retrying the same `batch_id` with the same entries after a crash
    /// reproduces the same [`BatchCommitResult`] without double-counting
    /// anything against the persisted log.
    fn put_batch(
        &self,
        batch_id: &[u8],
        entries: &[(Fingerprint, BlockHeight)],
    ) -> Result<BatchCommitResult, OnionError>;

    /// Remove fingerprints recorded below `horizon`, once the caller has
    /// determined no packet referencing them could still be valid.
    fn gc(&self, horizon: BlockHeight) -> Result<(), OnionError>;
}

/// Resolve in-batch duplicates before anything touches persistent storage:
/// for each fingerprint, every occurrence after its first in `entries` is a
/// duplicate. Shared between backends so both agree on "lowest index wins".
pub(crate) fn in_batch_duplicates(entries: &[(Fingerprint, BlockHeight)]) -> BTreeSet<usize> {
    let mut seen = std::collections::HashSet::with_capacity(entries.len());
    let mut duplicates = BTreeSet::new();
    for (i, (fp, _)) in entries.iter().enumerate() {
        if !seen.insert(*fp) {
            duplicates.insert(i);
        }
    }
    duplicates
}
