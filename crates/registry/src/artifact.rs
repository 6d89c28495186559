//! Push, pull, tag and list operations over artifact references.

use age::x25519;
use chrono::{SecondsFormat, Utc};
use metrics::counter;
use semver::{Version, VersionReq};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::client::{RegistryClient, MANIFEST_MEDIA_TYPE};
use crate::encryption;
use crate::metadata::{Metadata, AGE_ENCRYPTION_VERSION};
use crate::tarball::{tar_content, untar_content};
use crate::url::Reference;
use crate::{Error, Result};

pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar";

const DATA_FILE: &str = "all.yaml";
const ENCRYPTED_DATA_FILE: &str = "all.yaml.age";

/// Packages the plaintext YAML as a single-layer image and pushes it under
/// the reference's tag. Returns the content-addressed reference of the
/// pushed manifest.
///
/// The checksum annotation is always computed over the plaintext, before
/// any encryption.
pub async fn push(
    client: &RegistryClient,
    url: &str,
    data: &[u8],
    mut meta: Metadata,
    recipients: &[x25519::Recipient],
) -> Result<String> {
    let reference = Reference::parse(url)?;
    counter!("artifact_push_total", 1u64);

    meta.checksum = format!("{:x}", Sha256::digest(data));
    meta.created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let (file_name, payload) = if recipients.is_empty() {
        (DATA_FILE, data.to_vec())
    } else {
        meta.encrypted = Some(AGE_ENCRYPTION_VERSION.to_string());
        (ENCRYPTED_DATA_FILE, encryption::encrypt(data, recipients)?)
    };

    let layer = tar_content(file_name, &payload)?;
    let layer_digest = client.upload_blob(&reference, layer.clone()).await?;

    // sentinel platform values keep registries from treating the artifact
    // as a runnable image
    let config = serde_json::to_vec(&serde_json::json!({
        "architecture": "yaml",
        "os": "kivo",
        "created": meta.created,
        "config": {},
        "rootfs": { "type": "layers", "diff_ids": [layer_digest] },
    }))
    .map_err(|e| Error::Internal(e.to_string()))?;
    let config_digest = client.upload_blob(&reference, config.clone()).await?;

    let manifest = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": MANIFEST_MEDIA_TYPE,
        "config": {
            "mediaType": CONFIG_MEDIA_TYPE,
            "digest": config_digest,
            "size": config.len(),
        },
        "layers": [{
            "mediaType": LAYER_MEDIA_TYPE,
            "digest": layer_digest,
            "size": layer.len(),
        }],
        "annotations": meta.to_annotations(),
    }))
    .map_err(|e| Error::Internal(e.to_string()))?;

    let digest = client
        .put_manifest(&reference, &reference.version(), MANIFEST_MEDIA_TYPE, manifest)
        .await?;
    debug!(reference = %reference.repo_url(), %digest, "artifact pushed");
    Ok(reference.with_digest(&digest))
}

/// Downloads and unpacks an artifact, decrypting when identities are given
/// and verifying the plaintext checksum against the manifest annotation.
pub async fn pull(
    client: &RegistryClient,
    url: &str,
    identities: &[x25519::Identity],
) -> Result<(String, Metadata)> {
    let reference = Reference::parse(url)?;
    counter!("artifact_pull_total", 1u64);

    let (manifest_bytes, digest) = client.get_manifest(&reference).await?;
    let manifest: Value = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| Error::Internal(format!("invalid manifest: {e}")))?;

    let annotations = manifest
        .get("annotations")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let mut meta = Metadata::from_annotations(&annotations)?;
    meta.digest = Some(reference.with_digest(&digest));

    if meta.encrypted.is_some() && identities.is_empty() {
        return Err(Error::EncryptedNoKey);
    }

    let layer_digest = manifest
        .get("layers")
        .and_then(Value::as_array)
        .and_then(|layers| layers.first())
        .and_then(|layer| layer.get("digest"))
        .and_then(Value::as_str)
        .ok_or(Error::EmptyImage)?;

    let blob = client.get_blob(&reference, layer_digest).await?;
    let mut content = untar_content(&blob)?;

    if meta.encrypted.as_deref() == Some(AGE_ENCRYPTION_VERSION) {
        content = encryption::decrypt(&content, identities)?;
    }

    let actual = format!("{:x}", Sha256::digest(&content));
    if actual != meta.checksum {
        return Err(Error::ChecksumMismatch {
            expected: meta.checksum.clone(),
            actual,
        });
    }

    let yaml = String::from_utf8(content)
        .map_err(|e| Error::Internal(format!("artifact is not valid UTF-8: {e}")))?;
    Ok((yaml, meta))
}

/// Re-tags an existing artifact by re-uploading its manifest bytes under
/// the new tag; the content digest is preserved.
pub async fn tag(client: &RegistryClient, url: &str, new_tag: &str) -> Result<String> {
    let reference = Reference::parse(url)?;
    let (manifest_bytes, _) = client.get_manifest(&reference).await?;
    let media_type = serde_json::from_slice::<Value>(&manifest_bytes)
        .ok()
        .and_then(|m| m.get("mediaType").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| MANIFEST_MEDIA_TYPE.to_string());

    client
        .put_manifest(&reference, new_tag, &media_type, manifest_bytes)
        .await?;
    Ok(reference.with_tag(new_tag))
}

/// Lists the tags of the given repository. Cosign signature tags are
/// excluded.
pub async fn list_tags(client: &RegistryClient, repo_url: &str) -> Result<Vec<String>> {
    let reference = Reference::parse(repo_url)?;
    let tags = client.list_tags(&reference).await?;
    Ok(tags.into_iter().filter(|t| !t.ends_with(".sig")).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemverMatch {
    pub version: Version,
    pub tag: String,
}

/// Filters tags by a semver constraint: tags that do not parse as semver
/// are dropped, the remainder are matched against the constraint and
/// sorted descending. A leading `v` on a tag is tolerated.
pub fn filter_semver(tags: &[String], expr: &str) -> Result<Vec<SemverMatch>> {
    let req = VersionReq::parse(expr).map_err(|e| Error::Semver {
        expr: expr.to_string(),
        reason: e.to_string(),
    })?;

    let mut matches: Vec<SemverMatch> = tags
        .iter()
        .filter_map(|tag| {
            let version = Version::parse(tag.trim_start_matches('v')).ok()?;
            req.matches(&version).then_some(SemverMatch {
                version,
                tag: tag.clone(),
            })
        })
        .collect();
    matches.sort_by(|a, b| b.version.cmp(&a.version));
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn semver_filter_drops_non_semver_and_sorts_descending() {
        let result = filter_semver(
            &tags(&["v1.0.0", "latest", "2.1.0", "v2.0.0", "not-a-version"]),
            ">=1.0.0",
        )
        .unwrap();
        let ordered: Vec<&str> = result.iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(ordered, vec!["2.1.0", "v2.0.0", "v1.0.0"]);
    }

    #[test]
    fn semver_filter_honors_the_constraint() {
        let result = filter_semver(&tags(&["1.0.0", "1.5.3", "2.0.0"]), "1.*").unwrap();
        let ordered: Vec<&str> = result.iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(ordered, vec!["1.5.3", "1.0.0"]);
    }

    #[test]
    fn bad_constraint_is_an_error() {
        assert!(filter_semver(&tags(&["1.0.0"]), "not a constraint").is_err());
    }
}
