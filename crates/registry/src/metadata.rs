//! Artifact metadata carried as OCI manifest annotations.

use std::collections::BTreeMap;

use crate::{Error, Result};

pub const VERSION_ANNOTATION: &str = "kivo.dev/version";
pub const CHECKSUM_ANNOTATION: &str = "kivo.dev/checksum";
pub const CREATED_ANNOTATION: &str = "kivo.dev/created";
pub const ENCRYPTED_ANNOTATION: &str = "kivo.dev/encrypted";
pub const SOURCE_ANNOTATION: &str = "kivo.dev/source";
pub const REVISION_ANNOTATION: &str = "kivo.dev/revision";

pub const AGE_ENCRYPTION_VERSION: &str = "age-encryption.org/v1";

/// Artifact annotations. The checksum is a SHA-256 hex over the plaintext
/// YAML, computed before encryption; encryption status is declared here so
/// a pull can fail early without a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub version: String,
    pub checksum: String,
    pub created: String,
    pub encrypted: Option<String>,
    pub source: Option<String>,
    pub revision: Option<String>,
    /// Content-addressed reference, filled on pull.
    pub digest: Option<String>,
}

impl Metadata {
    pub fn to_annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        annotations.insert(VERSION_ANNOTATION.to_string(), self.version.clone());
        annotations.insert(CHECKSUM_ANNOTATION.to_string(), self.checksum.clone());
        annotations.insert(CREATED_ANNOTATION.to_string(), self.created.clone());
        if let Some(encrypted) = &self.encrypted {
            annotations.insert(ENCRYPTED_ANNOTATION.to_string(), encrypted.clone());
        }
        if let Some(source) = &self.source {
            annotations.insert(SOURCE_ANNOTATION.to_string(), source.clone());
        }
        if let Some(revision) = &self.revision {
            annotations.insert(REVISION_ANNOTATION.to_string(), revision.clone());
        }
        annotations
    }

    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self> {
        let version = annotations
            .get(VERSION_ANNOTATION)
            .ok_or_else(|| Error::MissingAnnotation(VERSION_ANNOTATION.into()))?
            .clone();
        let checksum = annotations
            .get(CHECKSUM_ANNOTATION)
            .ok_or_else(|| Error::MissingAnnotation(CHECKSUM_ANNOTATION.into()))?
            .clone();
        Ok(Self {
            version,
            checksum,
            created: annotations.get(CREATED_ANNOTATION).cloned().unwrap_or_default(),
            encrypted: annotations.get(ENCRYPTED_ANNOTATION).cloned(),
            source: annotations.get(SOURCE_ANNOTATION).cloned(),
            revision: annotations.get(REVISION_ANNOTATION).cloned(),
            digest: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_round_trip() {
        let meta = Metadata {
            version: "0.4.0".into(),
            checksum: "abc123".into(),
            created: "2024-06-01T12:00:00Z".into(),
            encrypted: Some(AGE_ENCRYPTION_VERSION.into()),
            source: Some("https://github.com/org/repo".into()),
            revision: Some("main@sha1:deadbeef".into()),
            digest: None,
        };
        let annotations = meta.to_annotations();
        assert_eq!(annotations[ENCRYPTED_ANNOTATION], AGE_ENCRYPTION_VERSION);
        let parsed = Metadata::from_annotations(&annotations).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn checksum_is_required() {
        let mut annotations = BTreeMap::new();
        annotations.insert(VERSION_ANNOTATION.to_string(), "0.4.0".to_string());
        let err = Metadata::from_annotations(&annotations).unwrap_err();
        assert!(matches!(err, Error::MissingAnnotation(a) if a == CHECKSUM_ANNOTATION));
    }
}
