//! Compact addressing: identifiers, roots and message ids.
//!
//! Everything here is pure string manipulation with no shared state, so it is
//! safe to call from any task without synchronization.
//!
//! ```text
//! identifier  <token>-<region>-<shard>
//! root        <identifier>r[^<identifier>r]
//! message id  <13-digit sequence>@<root><kind>
//! ```

mod composed;
mod message;
mod root;
#[cfg(test)]
mod tests;

pub use composed::*;
pub use message::*;
pub use root::*;
