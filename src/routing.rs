//! C4: routing-info assembly. Builds the 1300-byte encrypted buffer that
//! carries every downstream hop's payload and per-hop HMAC.

use secp256k1::{PublicKey, Secp256k1, SecretKey, Signing, Verification};

use crate::error::OnionError;
use crate::filler::{generate_filler, PacketFiller, ROUTING_INFO_SIZE};
use crate::keys::{derive_key, generate_hop_keys, hmac_sha256, KeyType};
use crate::path::PaymentPath;
use crate::stream::{generate_cipher_stream, xor_in_place};

pub const HMAC_SIZE: usize = 32;

/// Everything the sender needs to build the first [`crate::packet::OnionPacket`].
pub struct RoutingInfo {
    pub first_ephemeral_pubkey: PublicKey,
    pub routing_info: [u8; ROUTING_INFO_SIZE],
    pub outer_hmac: [u8; HMAC_SIZE],
}

/// Build the routing info for `path`, right-padding with filler and
/// encrypting in reverse path order so that each hop's HMAC covers
/// everything downstream of it plus `associated_data`.
pub fn build_routing_info<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    session_key: &SecretKey,
    path: &PaymentPath,
    associated_data: &[u8],
    filler: &dyn PacketFiller,
) -> Result<RoutingInfo, OnionError> {
    let hops = path.hops();
    let n = hops.len();

    let frame_lens: Vec<usize> = hops.iter().map(|h| h.payload.frame_len()).collect();
    let total: usize = frame_lens.iter().sum();
    if total > ROUTING_INFO_SIZE {
        return Err(OnionError::RoutingInfoTooLarge {
            total,
            capacity: ROUTING_INFO_SIZE,
        });
    }

    let hop_keys = generate_hop_keys(secp, session_key, &path.pubkeys())?;
    let filler_bytes = generate_filler(&hop_keys, &frame_lens);

    let mut mix = filler.initial_mix(session_key);
    let mut next_hmac = [0u8; HMAC_SIZE];

    for i in (0..n).rev() {
        let frame_len = frame_lens[i];

        // Right-shift by frame_len, dropping the rightmost frame_len bytes.
        mix.copy_within(0..ROUTING_INFO_SIZE - frame_len, frame_len);

        let body = hops[i].payload.encode_body();
        mix[..body.len()].copy_from_slice(&body);
        mix[body.len()..frame_len].copy_from_slice(&next_hmac);

        let rho_key = derive_key(KeyType::Rho, &hop_keys[i].shared_secret);
        let stream = generate_cipher_stream(&rho_key, ROUTING_INFO_SIZE);
        xor_in_place(&mut mix, &stream);

        if i == n - 1 && !filler_bytes.is_empty() {
            let flen = filler_bytes.len();
            mix[ROUTING_INFO_SIZE - flen..].copy_from_slice(&filler_bytes);
        }

        let mu_key = derive_key(KeyType::Mu, &hop_keys[i].shared_secret);
        let mut mac_input = Vec::with_capacity(ROUTING_INFO_SIZE + associated_data.len());
        mac_input.extend_from_slice(&mix);
        mac_input.extend_from_slice(associated_data);
        next_hmac = hmac_sha256(&mu_key, &mac_input);
    }

    Ok(RoutingInfo {
        first_ephemeral_pubkey: hop_keys[0].ephemeral_pubkey,
        routing_info: mix,
        outer_hmac: next_hmac,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filler::BlankPacketFiller;
    use crate::path::OnionHop;
    use crate::payload::{HopPayload, LegacyHopData};
    use rand::rngs::OsRng;

    fn legacy_hop(secp: &Secp256k1<secp256k1::All>, cltv: u32) -> (SecretKey, OnionHop) {
        let key = SecretKey::new(&mut OsRng);
        let pubkey = PublicKey::from_secret_key(secp, &key);
        let hop = OnionHop::new(
            pubkey,
            HopPayload::Legacy(LegacyHopData {
                next_address: [0; 8],
                forward_amount_msat: 1000,
                outgoing_cltv: cltv,
            }),
        );
        (key, hop)
    }

    #[test]
    fn oversize_path_fails_construction() {
        let secp = Secp256k1::new();
        let session_key = SecretKey::new(&mut OsRng);
        let hops: Vec<_> = (0..3)
            .map(|_| {
                let key = SecretKey::new(&mut OsRng);
                let pubkey = PublicKey::from_secret_key(&secp, &key);
                OnionHop::new(pubkey, HopPayload::Tlv(vec![0xab; 500]))
            })
            .collect();
        let path = PaymentPath::new(hops).unwrap();
        let result = build_routing_info(&secp, &session_key, &path, &[], &BlankPacketFiller);
        assert!(matches!(result, Err(OnionError::RoutingInfoTooLarge { .. })));
    }

    #[test]
    fn twenty_legacy_hops_exactly_fill_routing_info() {
        // 20 * 65 == ROUTING_INFO_SIZE exactly; this must succeed, not be
        // rejected as oversized.
        let secp = Secp256k1::new();
        let session_key = SecretKey::new(&mut OsRng);
        let hops: Vec<_> = (0..20u32).map(|i| legacy_hop(&secp, 40 + i).1).collect();
        let path = PaymentPath::new(hops).unwrap();
        let result = build_routing_info(&secp, &session_key, &path, &[], &BlankPacketFiller);
        assert!(result.is_ok());
    }

    #[test]
    fn single_hop_routing_info_has_no_filler_tail_dependency() {
        let secp = Secp256k1::new();
        let session_key = SecretKey::new(&mut OsRng);
        let (_key, hop) = legacy_hop(&secp, 40);
        let path = PaymentPath::new(vec![hop]).unwrap();
        let result = build_routing_info(&secp, &session_key, &path, &[], &BlankPacketFiller).unwrap();
        assert_eq!(result.routing_info.len(), ROUTING_INFO_SIZE);
    }
}
