//! Registry credentials from the Docker CLI config file.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use base64::Engine;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuth>,
}

#[derive(Debug, Deserialize)]
struct DockerAuth {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

fn config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(".docker").join("config.json"))
}

/// Looks up the credentials for the given registry host in
/// `~/.docker/config.json`. Missing or unreadable config means anonymous
/// access.
pub fn docker_credentials(registry: &str) -> Option<Credential> {
    let path = config_path()?;
    let data = fs::read_to_string(&path).ok()?;
    let config: DockerConfig = match serde_json::from_str(&data) {
        Ok(c) => c,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "unreadable docker config");
            return None;
        }
    };

    for (key, auth) in &config.auths {
        if !key_matches(key, registry) {
            continue;
        }
        if let Some(encoded) = &auth.auth {
            if let Some(cred) = decode_auth(encoded) {
                return Some(cred);
            }
        }
        if let (Some(username), Some(password)) = (&auth.username, &auth.password) {
            return Some(Credential {
                username: username.clone(),
                password: password.clone(),
            });
        }
    }
    None
}

/// Docker config keys come in several historical shapes:
/// `registry.example.com`, `https://registry.example.com`, and the Docker
/// Hub legacy `https://index.docker.io/v1/`.
fn key_matches(key: &str, registry: &str) -> bool {
    let host = key
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .trim_end_matches("/v1");
    if host == registry {
        return true;
    }
    registry == "docker.io" && host == "index.docker.io"
}

fn decode_auth(encoded: &str) -> Option<Credential> {
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credential {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_basic_auth_entries() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("user:hunter2");
        let cred = decode_auth(&encoded).unwrap();
        assert_eq!(cred.username, "user");
        assert_eq!(cred.password, "hunter2");
        assert!(decode_auth("not-base64!").is_none());
    }

    #[test]
    fn matches_config_key_shapes() {
        assert!(key_matches("ghcr.io", "ghcr.io"));
        assert!(key_matches("https://ghcr.io", "ghcr.io"));
        assert!(key_matches("https://index.docker.io/v1/", "docker.io"));
        assert!(!key_matches("ghcr.io", "quay.io"));
    }
}
