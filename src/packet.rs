//! C5 (wire codec) and C6 (peeling) for the onion packet itself.
//!
//! An [`OnionPacket`] is the 1366-byte unit exchanged between hops: a version
//! byte, a compressed ephemeral public key, the encrypted routing info, and
//! the HMAC that lets the receiving hop authenticate everything downstream of
//! it before acting on any of it.

use secp256k1::{PublicKey, Secp256k1, SecretKey, Signing, Verification};
use subtle::ConstantTimeEq;

use crate::error::OnionError;
use crate::filler::ROUTING_INFO_SIZE;
use crate::keys::{compute_shared_secret, derive_key, hmac_sha256, next_ephemeral_pubkey, KeyType};
use crate::payload::HopPayload;
use crate::routing::{build_routing_info, HMAC_SIZE};
use crate::stream::{generate_cipher_stream, xor_in_place};
use crate::path::PaymentPath;
use crate::filler::PacketFiller;

pub const VERSION: u8 = 0x00;
pub const PUBKEY_SIZE: usize = 33;
pub const PACKET_SIZE: usize = 1 + PUBKEY_SIZE + ROUTING_INFO_SIZE + HMAC_SIZE;

/// The wire form of a Sphinx onion packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnionPacket {
    pub version: u8,
    pub ephemeral_pubkey: PublicKey,
    pub routing_info: [u8; ROUTING_INFO_SIZE],
    pub hmac: [u8; HMAC_SIZE],
}

impl OnionPacket {
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        out[0] = self.version;
        out[1..1 + PUBKEY_SIZE].copy_from_slice(&self.ephemeral_pubkey.serialize());
        out[1 + PUBKEY_SIZE..1 + PUBKEY_SIZE + ROUTING_INFO_SIZE].copy_from_slice(&self.routing_info);
        out[PACKET_SIZE - HMAC_SIZE..].copy_from_slice(&self.hmac);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, OnionError> {
        if buf.len() != PACKET_SIZE {
            return Err(OnionError::InvalidPacketLength {
                expected: PACKET_SIZE,
                actual: buf.len(),
            });
        }
        let version = buf[0];
        if version != VERSION {
            return Err(OnionError::InvalidPacketVersion(version));
        }
        let ephemeral_pubkey = PublicKey::from_slice(&buf[1..1 + PUBKEY_SIZE])?;
        let mut routing_info = [0u8; ROUTING_INFO_SIZE];
        routing_info.copy_from_slice(&buf[1 + PUBKEY_SIZE..1 + PUBKEY_SIZE + ROUTING_INFO_SIZE]);
        let mut hmac = [0u8; HMAC_SIZE];
        hmac.copy_from_slice(&buf[PACKET_SIZE - HMAC_SIZE..]);
        Ok(Self {
            version,
            ephemeral_pubkey,
            routing_info,
            hmac,
        })
    }
}

/// Build the first packet a sender transmits for `path`.
pub fn create_onion_packet<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    session_key: &SecretKey,
    path: &PaymentPath,
    associated_data: &[u8],
    filler: &dyn PacketFiller,
) -> Result<OnionPacket, OnionError> {
    let built = build_routing_info(secp, session_key, path, associated_data, filler)?;
    Ok(OnionPacket {
        version: VERSION,
        ephemeral_pubkey: built.first_ephemeral_pubkey,
        routing_info: built.routing_info,
        hmac: built.outer_hmac,
    })
}

/// What a hop should do after successfully peeling one layer.
#[derive(Debug)]
pub enum HopAction {
    /// Forward `next_packet` to the peer reachable via the decoded payload.
    MoreHops { next_packet: OnionPacket },
    /// This hop is the final destination; there is no next packet.
    ExitNode,
}

/// The result of processing one layer: this hop's own payload, the shared
/// secret (the fingerprint replay protection keys on), and what to do next.
#[derive(Debug)]
pub struct HopProcessingResult {
    pub payload: HopPayload,
    pub shared_secret: [u8; 32],
    pub action: HopAction,
}

/// Peel one layer off `packet` using this hop's private key.
///
/// Verifies the outer HMAC, XORs the routing info with this hop's `rho`
/// stream, decodes the leading frame as this hop's payload, and — unless the
/// recovered next HMAC is all-zero (the terminal-hop marker) — assembles the
/// packet to forward.
pub fn peel_onion_packet<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    node_key: &SecretKey,
    packet: &OnionPacket,
    associated_data: &[u8],
) -> Result<HopProcessingResult, OnionError> {
    let shared_secret = compute_shared_secret(secp, node_key, &packet.ephemeral_pubkey)?;
    peel_with_shared_secret(secp, &shared_secret, packet, associated_data)
}

/// Same as [`peel_onion_packet`] but takes an already-computed shared secret,
/// letting a caller that has already derived it for replay-fingerprinting
/// purposes avoid a second scalar multiplication.
pub fn peel_with_shared_secret<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    shared_secret: &[u8; 32],
    packet: &OnionPacket,
    associated_data: &[u8],
) -> Result<HopProcessingResult, OnionError> {
    let mu_key = derive_key(KeyType::Mu, shared_secret);
    let mut mac_input = Vec::with_capacity(ROUTING_INFO_SIZE + associated_data.len());
    mac_input.extend_from_slice(&packet.routing_info);
    mac_input.extend_from_slice(associated_data);
    let expected_hmac = hmac_sha256(&mu_key, &mac_input);

    if expected_hmac.ct_eq(&packet.hmac).unwrap_u8() == 0 {
        return Err(OnionError::InvalidOnionHMAC);
    }

    let rho_key = derive_key(KeyType::Rho, shared_secret);
    // Peeling needs rho-stream bytes beyond the buffer to fill the space
    // vacated by the frame this hop consumes and strips off the front.
    let stream = generate_cipher_stream(&rho_key, 2 * ROUTING_INFO_SIZE);

    let mut extended = Vec::with_capacity(2 * ROUTING_INFO_SIZE);
    extended.extend_from_slice(&packet.routing_info);
    extended.extend(std::iter::repeat(0u8).take(ROUTING_INFO_SIZE));
    xor_in_place(&mut extended, &stream);

    let (payload, body_len) = HopPayload::decode_body(&extended)?;
    let frame_len = body_len + HMAC_SIZE;

    let mut next_hmac = [0u8; HMAC_SIZE];
    next_hmac.copy_from_slice(&extended[body_len..frame_len]);

    let action = if next_hmac == [0u8; HMAC_SIZE] {
        HopAction::ExitNode
    } else {
        let mut next_routing_info = [0u8; ROUTING_INFO_SIZE];
        next_routing_info.copy_from_slice(&extended[frame_len..frame_len + ROUTING_INFO_SIZE]);
        let next_ephemeral = next_ephemeral_pubkey(secp, &packet.ephemeral_pubkey, shared_secret)?;
        HopAction::MoreHops {
            next_packet: OnionPacket {
                version: VERSION,
                ephemeral_pubkey: next_ephemeral,
                routing_info: next_routing_info,
                hmac: next_hmac,
            },
        }
    };

    Ok(HopProcessingResult {
        payload,
        shared_secret: *shared_secret,
        action,
    })
}
