//! C3: hop payload codec.
//!
//! A hop payload is either a fixed 65-byte legacy frame or a BigSize-prefixed
//! TLV frame. This module only knows how to frame and parse the bytes; it
//! never interprets TLV content.

use crate::error::OnionError;

pub const HMAC_SIZE: usize = 32;
/// realm(1) + next_address(8) + forward_amount(8) + cltv(4) + padding(12)
pub const LEGACY_BODY_SIZE: usize = 33;
pub const LEGACY_FRAME_SIZE: usize = LEGACY_BODY_SIZE + HMAC_SIZE;

/// The structured body of a legacy (pre-TLV) hop payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyHopData {
    pub next_address: [u8; 8],
    pub forward_amount_msat: u64,
    pub outgoing_cltv: u32,
}

/// A single hop's payload, tagged so the encoder can never confuse the two
/// wire shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopPayload {
    Legacy(LegacyHopData),
    Tlv(Vec<u8>),
}

impl HopPayload {
    /// Total bytes this payload consumes in the routing info, including its
    /// trailing HMAC slot.
    pub fn frame_len(&self) -> usize {
        match self {
            HopPayload::Legacy(_) => LEGACY_FRAME_SIZE,
            HopPayload::Tlv(bytes) => bigsize_len(bytes.len() as u64) + bytes.len() + HMAC_SIZE,
        }
    }

    /// Encode the frame body (everything but the HMAC slot).
    pub(crate) fn encode_body(&self) -> Vec<u8> {
        match self {
            HopPayload::Legacy(data) => {
                let mut out = Vec::with_capacity(LEGACY_BODY_SIZE);
                out.push(0x00); // realm
                out.extend_from_slice(&data.next_address);
                out.extend_from_slice(&data.forward_amount_msat.to_be_bytes());
                out.extend_from_slice(&data.outgoing_cltv.to_be_bytes());
                out.extend_from_slice(&[0u8; 12]);
                out
            }
            HopPayload::Tlv(bytes) => {
                let mut out = Vec::with_capacity(bigsize_len(bytes.len() as u64) + bytes.len());
                encode_bigsize(bytes.len() as u64, &mut out);
                out.extend_from_slice(bytes);
                out
            }
        }
    }

    /// Decode a frame body from the head of `buf`. `buf` must be the full
    /// routing-info-sized decrypted buffer (or at least long enough to hold
    /// this hop's frame plus its HMAC slot). Returns the payload and the
    /// number of bytes consumed by the body (not including the HMAC slot).
    pub(crate) fn decode_body(buf: &[u8]) -> Result<(Self, usize), OnionError> {
        if buf.is_empty() {
            return Err(OnionError::InvalidPayload("empty frame"));
        }

        if buf[0] == 0x00 {
            if buf.len() < LEGACY_FRAME_SIZE {
                return Err(OnionError::InvalidPayload("legacy frame exceeds routing info bounds"));
            }
            let mut next_address = [0u8; 8];
            next_address.copy_from_slice(&buf[1..9]);
            let forward_amount_msat = u64::from_be_bytes(buf[9..17].try_into().unwrap());
            let outgoing_cltv = u32::from_be_bytes(buf[17..21].try_into().unwrap());
            Ok((
                HopPayload::Legacy(LegacyHopData {
                    next_address,
                    forward_amount_msat,
                    outgoing_cltv,
                }),
                LEGACY_BODY_SIZE,
            ))
        } else {
            let (len, prefix_len) = decode_bigsize(buf)?;
            let len = len as usize;
            let total = prefix_len + len;
            if buf.len() < total + HMAC_SIZE {
                return Err(OnionError::InvalidPayload("tlv frame exceeds routing info bounds"));
            }
            Ok((HopPayload::Tlv(buf[prefix_len..total].to_vec()), total))
        }
    }
}

/// BigSize-encoded length prefix: 1, 3, 5, or 9 bytes depending on magnitude.
pub fn bigsize_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub fn encode_bigsize(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_be_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Returns `(value, bytes_consumed)`.
pub fn decode_bigsize(buf: &[u8]) -> Result<(u64, usize), OnionError> {
    if buf.is_empty() {
        return Err(OnionError::InvalidPayload("truncated bigsize prefix"));
    }
    match buf[0] {
        0xfd => {
            if buf.len() < 3 {
                return Err(OnionError::InvalidPayload("truncated bigsize prefix"));
            }
            Ok((u16::from_be_bytes(buf[1..3].try_into().unwrap()) as u64, 3))
        }
        0xfe => {
            if buf.len() < 5 {
                return Err(OnionError::InvalidPayload("truncated bigsize prefix"));
            }
            Ok((u32::from_be_bytes(buf[1..5].try_into().unwrap()) as u64, 5))
        }
        0xff => {
            if buf.len() < 9 {
                return Err(OnionError::InvalidPayload("truncated bigsize prefix"));
            }
            Ok((u64::from_be_bytes(buf[1..9].try_into().unwrap()), 9))
        }
        v => Ok((v as u64, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigsize_roundtrips_at_boundaries() {
        for v in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000] {
            let mut out = Vec::new();
            encode_bigsize(v, &mut out);
            assert_eq!(out.len(), bigsize_len(v));
            let (decoded, consumed) = decode_bigsize(&out).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(consumed, out.len());
        }
    }

    #[test]
    fn legacy_frame_roundtrips() {
        let payload = HopPayload::Legacy(LegacyHopData {
            next_address: [1, 2, 3, 4, 5, 6, 7, 8],
            forward_amount_msat: 123_456,
            outgoing_cltv: 500,
        });
        let mut body = payload.encode_body();
        assert_eq!(body.len(), LEGACY_BODY_SIZE);
        body.extend_from_slice(&[0u8; HMAC_SIZE]);
        let (decoded, consumed) = HopPayload::decode_body(&body).unwrap();
        assert_eq!(consumed, LEGACY_BODY_SIZE);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn tlv_frame_roundtrips() {
        let payload = HopPayload::Tlv(vec![0xaa; 300]);
        let mut body = payload.encode_body();
        body.extend_from_slice(&[0u8; HMAC_SIZE]);
        let (decoded, consumed) = HopPayload::decode_body(&body).unwrap();
        assert_eq!(consumed, bigsize_len(300) + 300);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn nonzero_leading_byte_is_never_read_as_legacy() {
        // The realm byte's only constructible value is 0x00 (LegacyHopData
        // carries no realm field); a leading byte of anything else is by
        // definition a BigSize prefix, never a "legacy frame with bad realm".
        let mut body = vec![0u8; 64];
        body[0] = 0x01; // bigsize value 1: one byte of TLV payload follows
        let (decoded, consumed) = HopPayload::decode_body(&body).unwrap();
        assert_eq!(decoded, HopPayload::Tlv(vec![0u8]));
        assert_eq!(consumed, 2);
    }
}
