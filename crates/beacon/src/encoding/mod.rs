//! Fixed-width text encodings used on the wire.
//!
//! - [`base32`]: Crockford and geohash alphabets over a shared bit packer.
//! - [`base58`]: order-preserving, fixed-width base58 for 128-bit values.

pub mod base32;
pub mod base58;
