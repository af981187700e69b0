//! C8 ([`Router`]) and C9 ([`BatchTransaction`]): the node-facing surface
//! that ties packet peeling to replay protection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::OnionError;
use crate::keys::compute_shared_secret;
use crate::packet::{peel_with_shared_secret, HopProcessingResult, OnionPacket};
use crate::replay::{fingerprint_of, BlockHeight, Fingerprint, ReplayLog};

/// A secp256k1 node key plus a replay log, exposing the two ways a hop
/// consumes onion packets: one at a time ([`Router::process_onion_packet`])
/// or batched for crash-consistent bulk commit ([`Router::begin_txn`]).
pub struct Router {
    secp: Secp256k1<secp256k1::All>,
    node_key: SecretKey,
    node_pubkey: PublicKey,
    config: RouterConfig,
    replay_log: Arc<dyn ReplayLog>,
    processed: AtomicU64,
    replayed: AtomicU64,
}

impl Router {
    pub fn new(
        node_key: SecretKey,
        config: RouterConfig,
        replay_log: Arc<dyn ReplayLog>,
    ) -> Result<Self, OnionError> {
        let secp = Secp256k1::new();
        let node_pubkey = PublicKey::from_secret_key(&secp, &node_key);
        replay_log.start()?;
        info!(node_pubkey = %node_pubkey, chain = ?config.chain_params, "router started");
        Ok(Self {
            secp,
            node_key,
            node_pubkey,
            config,
            replay_log,
            processed: AtomicU64::new(0),
            replayed: AtomicU64::new(0),
        })
    }

    pub fn node_pubkey(&self) -> PublicKey {
        self.node_pubkey
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn replayed_count(&self) -> u64 {
        self.replayed.load(Ordering::Relaxed)
    }

    /// Peel `packet` and, in the same call, consult and update the
    /// persistent replay log. Returns [`OnionError::ReplayedPacket`] if the
    /// derived shared secret has been seen at or before `height` already.
    pub fn process_onion_packet(
        &self,
        packet: &OnionPacket,
        height: BlockHeight,
    ) -> Result<HopProcessingResult, OnionError> {
        let associated_data = self.config.chain_params.associated_data();
        let shared_secret = compute_shared_secret(&self.secp, &self.node_key, &packet.ephemeral_pubkey)?;
        let result = peel_with_shared_secret(&self.secp, &shared_secret, packet, associated_data)?;

        let fingerprint = fingerprint_of(&shared_secret);
        if self.replay_log.put(fingerprint, height)? {
            self.replayed.fetch_add(1, Ordering::Relaxed);
            warn!("rejected replayed onion packet");
            return Err(OnionError::ReplayedPacket);
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    /// Start a batch: packets processed through the returned
    /// [`BatchTransaction`] are peeled and validated immediately, but their
    /// fingerprints are only checked against (and written to) the
    /// persistent log once, atomically, at [`BatchTransaction::commit`].
    pub fn begin_txn(&self, batch_id: impl Into<Vec<u8>>, height: BlockHeight) -> BatchTransaction<'_> {
        BatchTransaction {
            router: self,
            batch_id: batch_id.into(),
            height,
            pending: Vec::new(),
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Err(err) = self.replay_log.stop() {
            warn!(%err, "replay log failed to stop cleanly");
        }
    }
}

struct PendingEntry {
    fingerprint: Fingerprint,
    result: HopProcessingResult,
}

/// A batch of packets processed against one [`Router`], committed together.
///
/// Peeling happens as each packet is added so a malformed packet fails
/// immediately rather than at commit time; only the replay check is
/// deferred, so the entire batch resolves its fingerprints in one
/// transaction against the persistent log.
pub struct BatchTransaction<'r> {
    router: &'r Router,
    batch_id: Vec<u8>,
    height: BlockHeight,
    pending: Vec<PendingEntry>,
}

/// The outcome of a committed batch: one slot per packet added, in the
/// order [`BatchTransaction::process_onion_packet`] was called.
pub struct BatchOutcome {
    pub results: Vec<Result<HopProcessingResult, OnionError>>,
}

impl<'r> BatchTransaction<'r> {
    /// Peel `packet` and queue it for this batch's commit. Returns the
    /// packet's position within the batch.
    pub fn process_onion_packet(&mut self, packet: &OnionPacket) -> Result<usize, OnionError> {
        let associated_data = self.router.config.chain_params.associated_data();
        let shared_secret =
            compute_shared_secret(&self.router.secp, &self.router.node_key, &packet.ephemeral_pubkey)?;
        let result = peel_with_shared_secret(&self.router.secp, &shared_secret, packet, associated_data)?;
        let fingerprint = fingerprint_of(&shared_secret);
        let position = self.pending.len();
        self.pending.push(PendingEntry { fingerprint, result });
        Ok(position)
    }

    /// Commit every queued packet's fingerprint in one transaction, then
    /// fold the duplicate positions the log reports back into a per-packet
    /// result: duplicates (whether against each other or against the
    /// persisted log) come back as [`OnionError::ReplayedPacket`].
    pub fn commit(self) -> Result<BatchOutcome, OnionError> {
        let entries: Vec<(Fingerprint, BlockHeight)> =
            self.pending.iter().map(|e| (e.fingerprint, self.height)).collect();
        let commit_result = self.router.replay_log.put_batch(&self.batch_id, &entries)?;

        debug!(
            batch_id = %hex::encode(&self.batch_id),
            size = self.pending.len(),
            duplicates = commit_result.duplicate_positions.len(),
            "committed batch"
        );

        self.router
            .processed
            .fetch_add((self.pending.len() - commit_result.duplicate_positions.len()) as u64, Ordering::Relaxed);
        self.router
            .replayed
            .fetch_add(commit_result.duplicate_positions.len() as u64, Ordering::Relaxed);

        let results = self
            .pending
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                if commit_result.duplicate_positions.contains(&i) {
                    Err(OnionError::ReplayedPacket)
                } else {
                    Ok(entry.result)
                }
            })
            .collect();

        Ok(BatchOutcome { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filler::DeterministicPacketFiller;
    use crate::packet::{create_onion_packet, HopAction};
    use crate::path::{OnionHop, PaymentPath};
    use crate::payload::{HopPayload, LegacyHopData};
    use crate::replay::MemoryReplayLog;
    use rand::rngs::OsRng;

    fn single_hop_packet(
        secp: &Secp256k1<secp256k1::All>,
        chain: &crate::config::ChainParams,
    ) -> (SecretKey, OnionPacket) {
        let node_key = SecretKey::new(&mut OsRng);
        let node_pubkey = PublicKey::from_secret_key(secp, &node_key);
        let path = PaymentPath::new(vec![OnionHop::new(
            node_pubkey,
            HopPayload::Legacy(LegacyHopData {
                next_address: [0; 8],
                forward_amount_msat: 1,
                outgoing_cltv: 9,
            }),
        )])
        .unwrap();
        let session_key = SecretKey::new(&mut OsRng);
        let packet = create_onion_packet(
            secp,
            &session_key,
            &path,
            chain.associated_data(),
            &DeterministicPacketFiller,
        )
        .unwrap();
        (node_key, packet)
    }

    #[test]
    fn single_packet_processes_then_rejects_replay() {
        let secp = Secp256k1::new();
        let config = RouterConfig::default();
        let (node_key, packet) = single_hop_packet(&secp, &config.chain_params);
        let router = Router::new(node_key, config, Arc::new(MemoryReplayLog::new())).unwrap();

        let result = router.process_onion_packet(&packet, 100).unwrap();
        assert!(matches!(result.action, HopAction::ExitNode));
        assert_eq!(router.processed_count(), 1);

        let replay = router.process_onion_packet(&packet, 100);
        assert!(matches!(replay, Err(OnionError::ReplayedPacket)));
        assert_eq!(router.replayed_count(), 1);
    }

    #[test]
    fn batch_commit_flags_in_batch_duplicate() {
        let secp = Secp256k1::new();
        let config = RouterConfig::default();
        let (node_key, packet) = single_hop_packet(&secp, &config.chain_params);
        let router = Router::new(node_key, config, Arc::new(MemoryReplayLog::new())).unwrap();

        let mut txn = router.begin_txn(b"batch-1".to_vec(), 50);
        txn.process_onion_packet(&packet).unwrap();
        txn.process_onion_packet(&packet).unwrap();
        let outcome = txn.commit().unwrap();

        assert!(outcome.results[0].is_ok());
        assert!(matches!(outcome.results[1], Err(OnionError::ReplayedPacket)));
    }

    #[test]
    fn batch_commit_is_idempotent_across_retries() {
        let secp = Secp256k1::new();
        let config = RouterConfig::default();
        let (node_key, packet) = single_hop_packet(&secp, &config.chain_params);
        let router = Router::new(node_key, config, Arc::new(MemoryReplayLog::new())).unwrap();

        let mut first = router.begin_txn(b"batch-1".to_vec(), 50);
        first.process_onion_packet(&packet).unwrap();
        let first_outcome = first.commit().unwrap();

        let mut retry = router.begin_txn(b"batch-1".to_vec(), 50);
        retry.process_onion_packet(&packet).unwrap();
        let retry_outcome = retry.commit().unwrap();

        assert_eq!(first_outcome.results[0].is_ok(), retry_outcome.results[0].is_ok());
    }

    #[test]
    fn cross_batch_replay_detected_on_commit() {
        let secp = Secp256k1::new();
        let config = RouterConfig::default();
        let (node_key, packet) = single_hop_packet(&secp, &config.chain_params);
        let router = Router::new(node_key, config, Arc::new(MemoryReplayLog::new())).unwrap();

        let mut first = router.begin_txn(b"batch-1".to_vec(), 50);
        first.process_onion_packet(&packet).unwrap();
        first.commit().unwrap();

        let mut second = router.begin_txn(b"batch-2".to_vec(), 50);
        second.process_onion_packet(&packet).unwrap();
        let outcome = second.commit().unwrap();
        assert!(matches!(outcome.results[0], Err(OnionError::ReplayedPacket)));
    }
}
