#![doc = include_str!("../README.md")]

pub mod campaign;
pub mod config;
pub mod encoding;
mod error;
pub mod fanout;
pub mod geo;
pub mod id;
pub mod message;
mod push_key;
mod rand;
pub mod sequence;
pub mod store;
mod time;
pub mod updates;

pub use crate::config::Settings;
pub use crate::error::*;
pub use crate::message::*;
pub use crate::push_key::*;
pub use crate::rand::*;
pub use crate::time::*;
