//! OCI artifact transport: deterministic packaging of a multi-doc manifest
//! stream into a content-addressed image layer with checksum, optional age
//! encryption, and tag/digest resolution.

#![forbid(unsafe_code)]

pub mod artifact;
pub mod auth;
pub mod client;
pub mod encryption;
pub mod metadata;
pub mod tarball;
pub mod url;

pub use artifact::{filter_semver, list_tags, pull, push, tag, SemverMatch};
pub use client::RegistryClient;
pub use metadata::{Metadata, AGE_ENCRYPTION_VERSION};
pub use url::{parse_repository_url, Reference};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("'{url}' invalid: {reason}; URL must be in format 'oci://<registry>/<repository>[:<tag>|@sha256:<digest>]'")]
    InvalidUrl { url: String, reason: String },

    #[error("checksum mismatch, expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("encrypted artifact, you need to supply a private key for decryption")]
    EncryptedNoKey,

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("'{0}' annotation not found")]
    MissingAnnotation(String),

    #[error("no layers found in image")]
    EmptyImage,

    #[error("registry auth failed: {0}")]
    Auth(String),

    #[error("registry responded with {status}: {message}")]
    Registry { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("semver '{expr}' parse error: {reason}")]
    Semver { expr: String, reason: String },

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
