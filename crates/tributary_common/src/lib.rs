//! Shared foundational types used across the Tributary graph loader.
//!
//! Currently this is the content hash used to fingerprint project directories
//! and command arguments for cache invalidation.

#![warn(missing_docs)]

pub mod hash;

pub use hash::{ContentHash, ContentHasher};
