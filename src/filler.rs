//! Packet filler strategies and the filler-generation algorithm itself.
//!
//! The filler is the subtle bit of Sphinx: it pre-fills the tail of the
//! routing info with bytes that the terminal hop will reproduce bit-exactly
//! via its own `rho` stream while peeling, so that the structure it observes
//! is indistinguishable from one more layer of onion rather than the edge of
//! the buffer.

use secp256k1::SecretKey;

use crate::keys::{derive_key, HopKeys, KeyType};
use crate::stream::{generate_cipher_stream, xor_in_place};

pub const ROUTING_INFO_SIZE: usize = 1300;

/// Strategy for the routing-info buffer's initial content, before any layers
/// are peeled onto it.
pub trait PacketFiller: std::fmt::Debug {
    fn initial_mix(&self, session_key: &SecretKey) -> [u8; ROUTING_INFO_SIZE];
}

/// Initializes the buffer with zeros. Used for reproducing fixed test
/// vectors, where the published routing info assumes a zeroed starting
/// buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankPacketFiller;

impl PacketFiller for BlankPacketFiller {
    fn initial_mix(&self, _session_key: &SecretKey) -> [u8; ROUTING_INFO_SIZE] {
        [0u8; ROUTING_INFO_SIZE]
    }
}

/// Initializes the buffer with a keystream derived from the session key, so
/// two packets built from different session keys never start from an
/// identical buffer even before any hop is written.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicPacketFiller;

impl PacketFiller for DeterministicPacketFiller {
    fn initial_mix(&self, session_key: &SecretKey) -> [u8; ROUTING_INFO_SIZE] {
        let seed = crate::keys::sha256(&session_key.secret_bytes());
        let seed_key = derive_key(KeyType::Pad, &seed);
        let stream = generate_cipher_stream(&seed_key, ROUTING_INFO_SIZE);
        let mut out = [0u8; ROUTING_INFO_SIZE];
        out.copy_from_slice(&stream);
        out
    }
}

/// Build the pseudorandom tail that construction writes into the last hop's
/// view of the routing info, so that hop's own decryption reconstructs it
/// exactly and the buffer it forwards (which it never actually uses, since
/// it is the terminal hop) looks like continued onion rather than padding.
///
/// For each hop but the last, expand `rho_i` to `RI_LEN + framelen(i)` bytes.
/// The already-accumulated filler is re-XORed with the leading `RI_LEN`
/// bytes of that stream — the same re-obfuscation peeling applies to those
/// bytes at hop `i` — before the trailing `framelen(i)` bytes of the stream
/// are appended as the new segment. Skipping that re-XOR step only happens
/// to be invisible for `n <= 2`, where the accumulated filler is still empty
/// the one time this loop runs.
pub fn generate_filler(hop_keys: &[HopKeys], frame_lens: &[usize]) -> Vec<u8> {
    let mut filler = Vec::new();
    if hop_keys.len() < 2 {
        return filler;
    }
    for i in 0..hop_keys.len() - 1 {
        let frame_len = frame_lens[i];
        let rho_key = derive_key(KeyType::Rho, &hop_keys[i].shared_secret);
        let stream_len = ROUTING_INFO_SIZE + frame_len;
        let stream = generate_cipher_stream(&rho_key, stream_len);

        let old_len = filler.len();
        xor_in_place(&mut filler, &stream[ROUTING_INFO_SIZE - old_len..ROUTING_INFO_SIZE]);
        filler.extend_from_slice(&stream[ROUTING_INFO_SIZE..]);
    }
    filler
}
