//! `oci://` URL grammar.

use crate::{Error, Result};

pub const URL_PREFIX: &str = "oci://";

/// A parsed artifact reference: `<registry>/<repository>[:tag|@sha256:digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl Reference {
    /// Parses an `oci://` URL. The prefix is mandatory; the tag defaults
    /// to `latest` when neither a tag nor a digest is given.
    pub fn parse(oci_url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrl {
            url: oci_url.to_string(),
            reason: reason.to_string(),
        };

        let rest = oci_url
            .strip_prefix(URL_PREFIX)
            .ok_or_else(|| invalid("missing 'oci://' prefix"))?;

        let (registry, remainder) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing repository path"))?;
        if registry.is_empty() {
            return Err(invalid("empty registry host"));
        }

        let (path, tag, digest) = match remainder.split_once('@') {
            Some((path, digest)) => {
                if !digest.starts_with("sha256:") {
                    return Err(invalid("digest must be 'sha256:<hex>'"));
                }
                (path, None, Some(digest.to_string()))
            }
            None => match remainder.rsplit_once(':') {
                // a ':' inside a path segment would be invalid anyway
                Some((path, tag)) if !tag.contains('/') => {
                    if tag.is_empty() {
                        return Err(invalid("empty tag"));
                    }
                    (path, Some(tag.to_string()), None)
                }
                _ => (remainder, None, None),
            },
        };

        if path.is_empty() {
            return Err(invalid("empty repository path"));
        }
        if let Some(t) = &tag {
            if !t
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            {
                return Err(invalid("tag contains invalid characters"));
            }
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: path.to_string(),
            tag,
            digest,
        })
    }

    /// The tag or digest used to address the manifest; `latest` when
    /// neither was given.
    pub fn version(&self) -> String {
        if let Some(digest) = &self.digest {
            return digest.clone();
        }
        self.tag.clone().unwrap_or_else(|| "latest".to_string())
    }

    /// `<registry>/<repository>` without tag or digest.
    pub fn repo_url(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// The content-addressed form for the given manifest digest.
    pub fn with_digest(&self, digest: &str) -> String {
        format!("{}@{}", self.repo_url(), digest)
    }

    pub fn with_tag(&self, tag: &str) -> String {
        format!("{}:{}", self.repo_url(), tag)
    }

    /// Base URL of the registry's distribution API for this repository.
    /// Local registries are reached over plain http.
    pub fn api_base(&self) -> String {
        format!("{}://{}/v2/{}", self.scheme(), self.registry, self.repository)
    }

    pub fn scheme(&self) -> &'static str {
        let host = self.registry.split(':').next().unwrap_or_default();
        if host == "localhost" || host == "127.0.0.1" || host == "[::1]" {
            "http"
        } else {
            "https"
        }
    }
}

/// Parses an `oci://` repository URL, tolerating (and dropping) a trailing
/// tag or digest.
pub fn parse_repository_url(oci_url: &str) -> Result<String> {
    let reference = Reference::parse(oci_url)?;
    Ok(reference.repo_url())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_reference() {
        let r = Reference::parse("oci://ghcr.io/user/app-deploy:v1.0.0").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "user/app-deploy");
        assert_eq!(r.tag.as_deref(), Some("v1.0.0"));
        assert_eq!(r.version(), "v1.0.0");
        assert_eq!(r.repo_url(), "ghcr.io/user/app-deploy");
        assert_eq!(r.scheme(), "https");
    }

    #[test]
    fn parses_digest_reference() {
        let digest = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
        let r = Reference::parse(&format!("oci://docker.io/user/repo@{digest}")).unwrap();
        assert_eq!(r.digest.as_deref(), Some(digest));
        assert_eq!(r.version(), digest);
    }

    #[test]
    fn defaults_to_latest() {
        let r = Reference::parse("oci://localhost:5000/repo").unwrap();
        assert_eq!(r.version(), "latest");
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.scheme(), "http");
        assert_eq!(r.api_base(), "http://localhost:5000/v2/repo");
    }

    #[test]
    fn port_is_not_mistaken_for_a_tag() {
        let r = Reference::parse("oci://localhost:5000/org/repo:dev").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "org/repo");
        assert_eq!(r.tag.as_deref(), Some("dev"));
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(Reference::parse("docker.io/user/repo:tag").is_err());
        assert!(Reference::parse("oci://docker.io").is_err());
        assert!(Reference::parse("oci://docker.io/repo@md5:abc").is_err());
        assert!(Reference::parse("oci://docker.io/repo:").is_err());
        assert!(Reference::parse("oci://docker.io/repo:bad tag").is_err());
    }

    #[test]
    fn repository_url_drops_the_tag() {
        assert_eq!(
            parse_repository_url("oci://ghcr.io/user/repo:v1").unwrap(),
            "ghcr.io/user/repo"
        );
    }
}
