//! Router configuration: which chain the node is processing for, and how
//! new outgoing packets should pad their initial routing-info buffer.

use crate::filler::{BlankPacketFiller, DeterministicPacketFiller, PacketFiller};

/// Which network's genesis-block associated data a [`crate::router::Router`]
/// expects incoming packets to be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainParams {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl ChainParams {
    /// The associated data HMAC inputs are bound to: BOLT-4 uses the
    /// genesis block hash so a packet built for one chain can never
    /// replay-validate on another.
    pub fn associated_data(self) -> &'static [u8] {
        match self {
            ChainParams::Mainnet => &[0x6f; 32],
            ChainParams::Testnet => &[0x43; 32],
            ChainParams::Signet => &[0xf9; 32],
            ChainParams::Regtest => &[0x06; 32],
        }
    }
}

/// Which [`PacketFiller`] strategy a sender should use when building new
/// packets. Kept as an enum rather than a trait object in config so it can
/// derive `Default`/`Debug`/`Clone` the way the rest of this module does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketFillerKind {
    Blank,
    #[default]
    Deterministic,
}

impl PacketFillerKind {
    pub fn build(self) -> Box<dyn PacketFiller> {
        match self {
            PacketFillerKind::Blank => Box::new(BlankPacketFiller),
            PacketFillerKind::Deterministic => Box::new(DeterministicPacketFiller),
        }
    }
}

/// Construction-time configuration for a [`crate::router::Router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub chain_params: ChainParams,
    pub filler_kind: PacketFillerKind,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            chain_params: ChainParams::Mainnet,
            filler_kind: PacketFillerKind::default(),
        }
    }
}
