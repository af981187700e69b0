//! C1 (key derivation) and C2 (shared-secret chain).
//!
//! `derive_key` turns a 32-byte ECDH shared secret into one of the five
//! keyed-stream labels used throughout Sphinx. `generate_hop_keys` walks the
//! session private key down a path, producing the ephemeral point and shared
//! secret the sender observes at each hop.

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Signing, Verification};
use sha2::{Digest, Sha256};

use crate::error::OnionError;

pub const SHARED_SECRET_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// The five keyed-stream labels Sphinx derives from a shared secret.
///
/// Only `Rho`, `Mu`, and `Pad` are consumed by this engine; `Um` and `Ammag`
/// key the error (return-path) onion, which is a separate construction and
/// out of scope here. They're kept in the enum so the derivation helper
/// stays a faithful, complete KDF rather than a partial one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rho,
    Mu,
    Pad,
    Um,
    Ammag,
}

impl KeyType {
    fn label(self) -> &'static [u8] {
        match self {
            KeyType::Rho => b"rho",
            KeyType::Mu => b"mu",
            KeyType::Pad => b"pad",
            KeyType::Um => b"um",
            KeyType::Ammag => b"ammag",
        }
    }
}

/// `HMAC-SHA256(key = label, msg = shared_secret)`.
pub fn derive_key(key_type: KeyType, shared_secret: &[u8; SHARED_SECRET_SIZE]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key_type.label())
        .expect("HMAC accepts a key of any length");
    mac.update(shared_secret);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn hmac_sha256(key: &[u8; 32], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("32-byte key");
    mac.update(msg);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Per-hop ephemeral point and shared secret, as seen by the sender.
#[derive(Debug, Clone, Copy)]
pub struct HopKeys {
    pub ephemeral_pubkey: PublicKey,
    pub shared_secret: [u8; SHARED_SECRET_SIZE],
}

fn scalar_of(key: &SecretKey) -> Result<Scalar, OnionError> {
    Scalar::from_be_bytes(key.secret_bytes()).map_err(|_| OnionError::ScalarOutOfRange)
}

/// Raw ECDH point between `scalar` and `point`, compressed and hashed —
/// `ss = SHA256(compress(scalar * point))`.
pub fn compute_shared_secret<C: Verification>(
    secp: &Secp256k1<C>,
    scalar: &SecretKey,
    point: &PublicKey,
) -> Result<[u8; SHARED_SECRET_SIZE], OnionError> {
    let tweak = scalar_of(scalar)?;
    let shared_point = point.mul_tweak(secp, &tweak)?;
    Ok(sha256(&shared_point.serialize()))
}

/// `b_i = SHA256(E_i || ss_i)`, the blinding factor mixed into the next
/// ephemeral scalar so each hop observes a distinct point.
pub fn blinding_factor(ephemeral_pubkey: &PublicKey, shared_secret: &[u8; SHARED_SECRET_SIZE]) -> [u8; 32] {
    let mut data = Vec::with_capacity(33 + SHARED_SECRET_SIZE);
    data.extend_from_slice(&ephemeral_pubkey.serialize());
    data.extend_from_slice(shared_secret);
    sha256(&data)
}

/// Walk the session key down `path_pubkeys`, producing the sequence of
/// `(E_i, ss_i)` pairs a sender needs to assemble the routing info.
pub fn generate_hop_keys<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    session_key: &SecretKey,
    path_pubkeys: &[PublicKey],
) -> Result<Vec<HopKeys>, OnionError> {
    let mut result = Vec::with_capacity(path_pubkeys.len());
    let mut e = *session_key;
    for pubkey in path_pubkeys {
        let ephemeral_pubkey = PublicKey::from_secret_key(secp, &e);
        let shared_secret = compute_shared_secret(secp, &e, pubkey)?;
        let b = blinding_factor(&ephemeral_pubkey, &shared_secret);
        result.push(HopKeys {
            ephemeral_pubkey,
            shared_secret,
        });
        let tweak = Scalar::from_be_bytes(b).map_err(|_| OnionError::ScalarOutOfRange)?;
        e = e.mul_tweak(&tweak)?;
    }
    Ok(result)
}

/// The receiving hop's half of C2: given the point it received and the
/// shared secret it just computed, derive the point it will hand the next
/// hop (`E' = b * E`).
pub fn next_ephemeral_pubkey<C: Verification>(
    secp: &Secp256k1<C>,
    received: &PublicKey,
    shared_secret: &[u8; SHARED_SECRET_SIZE],
) -> Result<PublicKey, OnionError> {
    let b = blinding_factor(received, shared_secret);
    let tweak = Scalar::from_be_bytes(b).map_err(|_| OnionError::ScalarOutOfRange)?;
    Ok(received.mul_tweak(secp, &tweak)?)
}
