//! BOLT-4 Sphinx onion packet construction, peeling, and replay protection.
//!
//! This crate is the packet engine only: given a path of hops and their
//! payloads, it builds the onion packet a sender transmits
//! ([`packet::create_onion_packet`]); given a received packet and a node's
//! private key, it peels one layer and tells the caller whether to forward
//! or terminate ([`router::Router::process_onion_packet`]); and it tracks
//! which packets a node has already processed so a replayed packet is
//! rejected rather than acted on twice ([`replay`]).
//!
//! Route selection, p2p transport, and channel-state handling for where a
//! peeled packet's payload sends the payment next are all out of scope —
//! this crate starts at "here is a path" and ends at "here is this hop's
//! payload and what to do with the rest".

pub mod config;
pub mod error;
pub mod filler;
pub mod keys;
pub mod packet;
pub mod path;
pub mod payload;
pub mod replay;
pub mod router;
pub mod routing;
mod stream;

pub use error::OnionError;
pub use packet::{create_onion_packet, peel_onion_packet, HopAction, HopProcessingResult, OnionPacket};
pub use path::{OnionHop, PaymentPath};
pub use payload::{HopPayload, LegacyHopData};
pub use router::{BatchOutcome, BatchTransaction, Router};
