//! `kivo pull artifact <oci-url>`: download, verify and print an artifact.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;

use kivo_registry::{self as registry, encryption, Reference};

use crate::App;

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Artifact URL in the format 'oci://<registry>/<repo>[:<tag>|@sha256:<digest>]'.
    pub url: String,

    /// Path to a file containing one or more age identities (private keys
    /// generated by age-keygen).
    #[arg(long = "age-identities")]
    pub age_identities: Option<PathBuf>,

    /// Verify the artifact signature with cosign before pulling.
    #[arg(long)]
    pub verify: bool,

    /// Path to the cosign public key file, KMS URI or Kubernetes Secret.
    #[arg(long = "cosign-key")]
    pub cosign_key: Option<PathBuf>,
}

pub async fn run(app: &App, args: PullArgs) -> Result<()> {
    let reference = Reference::parse(&args.url)?;

    if args.verify {
        verify_cosign(&reference, args.cosign_key.as_deref())?;
    }

    let identities = match &args.age_identities {
        Some(path) => encryption::parse_identities_file(path)
            .context("failed to read decryption keys")?,
        None => Vec::new(),
    };

    let client = app.registry_client()?;
    let (yaml, _meta) = registry::pull(&client, &args.url, &identities)
        .await
        .with_context(|| format!("pulling {} failed", args.url))?;

    println!("{yaml}");
    Ok(())
}

/// Signature verification is delegated to the cosign binary; signatures
/// live under a sibling `.sig` tag in the same repository.
fn verify_cosign(reference: &Reference, key: Option<&std::path::Path>) -> Result<()> {
    let mut cmd = Command::new("cosign");
    cmd.arg("verify");
    if let Some(key) = key {
        cmd.arg("--key").arg(key);
    }
    let image = match &reference.digest {
        Some(digest) => reference.with_digest(digest),
        None => reference.with_tag(&reference.version()),
    };
    cmd.arg(image);

    let status = cmd
        .status()
        .map_err(|e| anyhow!("cosign not found in $PATH: {e}"))?;
    if !status.success() {
        bail!("cosign verification failed for {}", reference.repo_url());
    }
    Ok(())
}
