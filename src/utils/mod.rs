//! Shared utilities used across the crate.
//!
//! Currently this is the growable [`BitSet`] used for active-guard tracking
//! and traversal bookkeeping.

mod bitset;

pub use bitset::BitSet;
