//! Kivo core types: object identity, multi-doc codec, apply ordering and
//! the process-wide configuration file.

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod objid;
pub mod paths;
pub mod sort;

pub use config::{Config, Owner};
pub use objid::ObjectId;
pub use sort::KindOrder;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid document at position {pos}: {reason}")]
    InvalidDocument { pos: usize, reason: String },
    #[error("invalid object id '{0}'")]
    InvalidObjectId(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

pub type Result<T> = std::result::Result<T, Error>;
