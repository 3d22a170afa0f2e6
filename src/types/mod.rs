//! Types and traits that are used across multiple components of IBFT-rs.
//!
//! Other types and traits, specific to single components of IBFT-rs, can be found in the "types" and
//! "messages" submodules of their components, e.g., [`crate::ibft::messages`].

pub mod block;

pub mod crypto_primitives;

pub mod data_types;

pub mod signed_payload;

pub mod validator_set;
