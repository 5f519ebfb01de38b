//! Common functionality for the Statok client.
//!
//! This crate contains the leaf utilities shared by the other Statok crates:
//! timestamp handling and object pooling. It intentionally has no
//! dependencies.
#![warn(missing_docs)]

pub mod pool;
pub mod time;
