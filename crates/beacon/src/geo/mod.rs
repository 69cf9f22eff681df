//! Geohash ring search.
//!
//! An [`Area`] is a centre plus a star-shaped perimeter: every sample carries
//! the maximum distance allowed from the centre in its direction. The ring
//! search turns an area into geohash cells ordered by their ring distance from
//! the centre cell, grouped into batches the document store can take in one
//! `IN` predicate.

pub mod geohash;
mod point;
mod ring;
#[cfg(test)]
mod tests;

pub use point::*;
pub use ring::*;
