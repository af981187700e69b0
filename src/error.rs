//! Error taxonomy for packet construction, peeling, and replay protection.

use thiserror::Error;

/// Errors raised anywhere in the Sphinx packet engine.
///
/// Variants map directly onto the failure modes a caller must distinguish:
/// construction-time sizing, wire decode, per-hop integrity, and replay
/// protection. None of these are recovered internally except
/// [`OnionError::LogIoFailure`], which a caller may retry by re-committing
/// the same batch id.
#[derive(Debug, Error)]
pub enum OnionError {
    #[error("path is empty")]
    EmptyPath,

    #[error("path has {0} hops, maximum is {max}", max = crate::path::MAX_HOPS)]
    PathTooLong(usize),

    #[error("sum of hop frame lengths ({total}) exceeds routing info capacity ({capacity})")]
    RoutingInfoTooLarge { total: usize, capacity: usize },

    #[error("invalid packet version: {0:#04x}")]
    InvalidPacketVersion(u8),

    #[error("invalid packet length: expected {expected}, got {actual}")]
    InvalidPacketLength { expected: usize, actual: usize },

    #[error("onion HMAC verification failed")]
    InvalidOnionHMAC,

    #[error("invalid hop payload: {0}")]
    InvalidPayload(&'static str),

    #[error("packet replayed")]
    ReplayedPacket,

    #[error("replay log I/O failure: {0}")]
    LogIoFailure(String),

    #[error("batch index {index} out of range (capacity {capacity})")]
    InvalidBatchIndex { index: usize, capacity: usize },

    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),

    #[error("derived scalar out of range")]
    ScalarOutOfRange,
}
