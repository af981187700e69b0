//! Data model for a payment path: an ordered list of hops, each carrying the
//! payload only that hop will be able to decrypt.

use secp256k1::PublicKey;

use crate::error::OnionError;
use crate::payload::HopPayload;

/// Sphinx bounds a path to 20 hops; the routing-info buffer is sized so that
/// construction fails well before this, but the bound is checked explicitly
/// so the error names the actual constraint.
pub const MAX_HOPS: usize = 20;

/// One hop in a payment path: the hop's public key and the payload only it
/// will be able to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnionHop {
    pub pubkey: PublicKey,
    pub payload: HopPayload,
}

impl OnionHop {
    pub fn new(pubkey: PublicKey, payload: HopPayload) -> Self {
        Self { pubkey, payload }
    }
}

/// An ordered, bounded sequence of hops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentPath(Vec<OnionHop>);

impl PaymentPath {
    pub fn new(hops: Vec<OnionHop>) -> Result<Self, OnionError> {
        if hops.is_empty() {
            return Err(OnionError::EmptyPath);
        }
        if hops.len() > MAX_HOPS {
            return Err(OnionError::PathTooLong(hops.len()));
        }
        Ok(Self(hops))
    }

    pub fn hops(&self) -> &[OnionHop] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pubkeys(&self) -> Vec<PublicKey> {
        self.0.iter().map(|h| h.pubkey).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{HopPayload, LegacyHopData};
    use rand::rngs::OsRng;
    use secp256k1::{Secp256k1, SecretKey};

    fn dummy_hop() -> OnionHop {
        let secp = Secp256k1::new();
        let key = SecretKey::new(&mut OsRng);
        OnionHop::new(
            PublicKey::from_secret_key(&secp, &key),
            HopPayload::Legacy(LegacyHopData {
                next_address: [0; 8],
                forward_amount_msat: 0,
                outgoing_cltv: 0,
            }),
        )
    }

    #[test]
    fn rejects_empty_path() {
        assert!(matches!(PaymentPath::new(vec![]), Err(OnionError::EmptyPath)));
    }

    #[test]
    fn rejects_paths_over_max_hops() {
        let hops: Vec<_> = (0..MAX_HOPS + 1).map(|_| dummy_hop()).collect();
        assert!(matches!(
            PaymentPath::new(hops),
            Err(OnionError::PathTooLong(21))
        ));
    }

    #[test]
    fn accepts_max_hops() {
        let hops: Vec<_> = (0..MAX_HOPS).map(|_| dummy_hop()).collect();
        assert!(PaymentPath::new(hops).is_ok());
    }
}
