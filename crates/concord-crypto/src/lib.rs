//! Reference Identity-collaborator implementation.
//!
//! Nothing in `concord-core` or the engine crates inspects key material
//! directly (§4.2: "the core never inspects key material"); signature
//! verification is always a call through the `Identity` collaborator trait.
//! This crate supplies a concrete, runnable implementation of that trait for
//! use by tests, the Hardening harness, and the `concord-node` demo binary.

pub mod dilithium;
pub mod hash;
pub mod keypair;

pub use hash::{blake3_hash, member_id_from_pubkey};
pub use keypair::KeyPair;
