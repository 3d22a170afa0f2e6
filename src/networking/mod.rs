//! Pluggable peer-to-peer (P2P) networking.

pub mod network;

pub(crate) mod receiving;

pub(crate) mod sending;
