//! Minimal OCI distribution client: manifests, blobs and tag listing over
//! the registry HTTP API, with Docker-config credentials and Bearer token
//! negotiation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::auth::{docker_credentials, Credential};
use crate::url::Reference;
use crate::{Error, Result};

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

const USER_AGENT: &str = concat!("kivo/", env!("CARGO_PKG_VERSION"));

pub struct RegistryClient {
    http: reqwest::Client,
    tokens: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl RegistryClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    /// Fetches the manifest addressed by the reference's tag or digest.
    /// Returns the raw manifest bytes plus their content digest.
    pub async fn get_manifest(&self, reference: &Reference) -> Result<(Vec<u8>, String)> {
        let url = format!("{}/manifests/{}", reference.api_base(), reference.version());
        let req = self
            .http
            .get(&url)
            .header(ACCEPT, format!("{MANIFEST_MEDIA_TYPE}, {DOCKER_MANIFEST_MEDIA_TYPE}"));
        let resp = self.send(reference, req).await?;
        let bytes = resp.bytes().await?.to_vec();
        let digest = sha256_digest(&bytes);
        Ok((bytes, digest))
    }

    /// Uploads a manifest under the given tag (or digest) and returns its
    /// content digest.
    pub async fn put_manifest(
        &self,
        reference: &Reference,
        version: &str,
        media_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let digest = sha256_digest(&bytes);
        let url = format!("{}/manifests/{version}", reference.api_base());
        let req = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, media_type)
            .body(bytes);
        self.send(reference, req).await?;
        Ok(digest)
    }

    pub async fn blob_exists(&self, reference: &Reference, digest: &str) -> Result<bool> {
        let url = format!("{}/blobs/{digest}", reference.api_base());
        let req = self.http.head(&url);
        match self.send(reference, req).await {
            Ok(_) => Ok(true),
            Err(Error::Registry { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Two-step monolithic blob upload; skipped when the registry already
    /// has the content.
    pub async fn upload_blob(&self, reference: &Reference, bytes: Vec<u8>) -> Result<String> {
        let digest = sha256_digest(&bytes);
        if self.blob_exists(reference, &digest).await? {
            debug!(%digest, "blob already present");
            return Ok(digest);
        }

        let start_url = format!("{}/blobs/uploads/", reference.api_base());
        let resp = self.send(reference, self.http.post(&start_url)).await?;
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Internal("upload session has no Location header".into()))?;
        let location = resolve_location(reference, location);

        let sep = if location.contains('?') { '&' } else { '?' };
        let put_url = format!("{location}{sep}digest={digest}");
        let req = self
            .http
            .put(&put_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        self.send(reference, req).await?;
        Ok(digest)
    }

    pub async fn get_blob(&self, reference: &Reference, digest: &str) -> Result<Vec<u8>> {
        let url = format!("{}/blobs/{digest}", reference.api_base());
        let resp = self.send(reference, self.http.get(&url)).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn list_tags(&self, reference: &Reference) -> Result<Vec<String>> {
        let url = format!("{}/tags/list?n=1000", reference.api_base());
        let resp = self.send(reference, self.http.get(&url)).await?;
        let list: TagList = resp.json().await?;
        Ok(list.tags.unwrap_or_default())
    }

    /// Sends the request, negotiating authentication on a 401 challenge:
    /// Bearer challenges go through the token endpoint with the Docker
    /// config credentials, Basic challenges retry with the credentials
    /// directly.
    async fn send(&self, reference: &Reference, req: RequestBuilder) -> Result<Response> {
        let req = match self.cached_token(&reference.registry) {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {token}")),
            None => req,
        };

        let request = req.build()?;
        let retry = request.try_clone();
        let resp = self.http.execute(request).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return into_result(resp).await;
        }

        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::Auth("unauthorized and no challenge offered".into()))?;
        let mut request = retry
            .ok_or_else(|| Error::Internal("request body cannot be replayed".into()))?;

        let credential = docker_credentials(&reference.registry);
        let header = if challenge.starts_with("Bearer") {
            let token = self.fetch_token(reference, &challenge, credential.as_ref()).await?;
            self.tokens
                .write()
                .unwrap()
                .insert(reference.registry.clone(), token.clone());
            format!("Bearer {token}")
        } else {
            let cred = credential
                .ok_or_else(|| Error::Auth(format!("no credentials for {}", reference.registry)))?;
            basic_header(&cred)
        };
        request.headers_mut().insert(
            AUTHORIZATION,
            header
                .parse()
                .map_err(|_| Error::Auth("invalid authorization header".into()))?,
        );

        into_result(self.http.execute(request).await?).await
    }

    fn cached_token(&self, registry: &str) -> Option<String> {
        self.tokens.read().unwrap().get(registry).cloned()
    }

    async fn fetch_token(
        &self,
        reference: &Reference,
        challenge: &str,
        credential: Option<&Credential>,
    ) -> Result<String> {
        let params = parse_challenge(challenge);
        let realm = params
            .get("realm")
            .ok_or_else(|| Error::Auth("Bearer challenge without realm".into()))?;

        let mut req = self.http.get(realm);
        if let Some(service) = params.get("service") {
            req = req.query(&[("service", service)]);
        }
        let scope = params
            .get("scope")
            .cloned()
            .unwrap_or_else(|| format!("repository:{}:pull,push", reference.repository));
        req = req.query(&[("scope", &scope)]);
        if let Some(cred) = credential {
            req = req.basic_auth(&cred.username, Some(&cred.password));
        }

        let resp = into_result(req.send().await?).await?;
        let token: TokenResponse = resp.json().await?;
        token
            .token
            .or(token.access_token)
            .ok_or_else(|| Error::Auth("token endpoint returned no token".into()))
    }
}

async fn into_result(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() || status.is_redirection() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    let message = message.chars().take(512).collect();
    Err(Error::Registry {
        status: status.as_u16(),
        message,
    })
}

fn basic_header(cred: &Credential) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", cred.username, cred.password));
    format!("Basic {encoded}")
}

/// Parses `Bearer realm="…",service="…",scope="…"` into its parameters.
fn parse_challenge(challenge: &str) -> HashMap<String, String> {
    let rest = challenge
        .strip_prefix("Bearer ")
        .or_else(|| challenge.strip_prefix("Basic "))
        .unwrap_or(challenge);
    let mut params = HashMap::new();
    for part in rest.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            params.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
        }
    }
    params
}

fn resolve_location(reference: &Reference, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    format!("{}://{}{location}", reference.scheme(), reference.registry)
}

pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_challenge() {
        let params = parse_challenge(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:user/repo:pull""#,
        );
        assert_eq!(params["realm"], "https://auth.docker.io/token");
        assert_eq!(params["service"], "registry.docker.io");
        assert_eq!(params["scope"], "repository:user/repo:pull");
    }

    #[test]
    fn resolves_relative_upload_location() {
        let r = Reference::parse("oci://localhost:5000/repo").unwrap();
        assert_eq!(
            resolve_location(&r, "/v2/repo/blobs/uploads/uuid"),
            "http://localhost:5000/v2/repo/blobs/uploads/uuid"
        );
        assert_eq!(
            resolve_location(&r, "http://other:5000/x"),
            "http://other:5000/x"
        );
    }

    #[test]
    fn digest_is_prefixed_hex() {
        let digest = sha256_digest(b"hello");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 64);
    }
}
