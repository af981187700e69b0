//! Keystream generation shared by routing-info encryption and packet filler.
//!
//! BOLT-4 derives a pseudorandom byte stream from a 32-byte key by running it
//! through ChaCha20 with an all-zero nonce; the "ciphertext" of an all-zero
//! plaintext of the requested length is the stream. This is the same trick
//! `rho`/`pad` keys are put to throughout the routing-info assembly.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;

const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// Produce `len` bytes of keystream derived from `key`.
pub fn generate_cipher_stream(key: &[u8; 32], len: usize) -> Vec<u8> {
    let mut cipher = ChaCha20::new(key.into(), &ZERO_NONCE.into());
    let mut buf = vec![0u8; len];
    cipher.apply_keystream(&mut buf);
    buf
}

/// XOR `stream` into `dst` in place. Panics if `stream` is shorter than `dst`.
pub fn xor_in_place(dst: &mut [u8], stream: &[u8]) {
    for (d, s) in dst.iter_mut().zip(stream.iter()) {
        *d ^= s;
    }
}
