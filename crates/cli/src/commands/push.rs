//! `kivo push artifact <oci-url>`: build the manifests and push them as a
//! signed-friendly, optionally encrypted OCI artifact.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use kivo_core::codec::objects_to_yaml;
use kivo_core::ObjectId;
use kivo_registry::{self as registry, encryption, Metadata};

use crate::logger;
use crate::manifests;
use crate::{App, VERSION};

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Artifact URL in the format 'oci://<registry>/<repo>:<tag>'.
    pub url: String,

    /// Path to Kubernetes manifest(s). Directories are scanned
    /// recursively.
    #[arg(short = 'f', long = "filename")]
    pub filename: Vec<PathBuf>,

    /// Path to a directory that contains a kustomization.yaml.
    #[arg(short = 'k', long = "kustomize")]
    pub kustomize: Option<PathBuf>,

    /// Path to a kustomization file that contains a list of patches.
    #[arg(short = 'p', long = "patch")]
    pub patch: Vec<PathBuf>,

    /// Path to a file containing one or more age public keys used to
    /// encrypt the artifact.
    #[arg(long = "age-recipients")]
    pub age_recipients: Option<PathBuf>,

    /// The URL to the source code.
    #[arg(long, default_value = "")]
    pub source: String,

    /// The revision identifier.
    #[arg(long, default_value = "")]
    pub revision: String,
}

pub async fn run(app: &App, args: PushArgs) -> Result<()> {
    if args.kustomize.is_none() && args.filename.is_empty() {
        bail!("-f or -k is required");
    }

    let mut objects =
        manifests::build_manifests(args.kustomize.as_deref(), &args.filename, &args.patch)?;
    app.config.apply_order().sort_for_apply(&mut objects);

    logger::action("building manifests...");
    for object in &objects {
        eprintln!("{}", ObjectId::from_object(object));
    }

    let yaml = objects_to_yaml(&objects)?;

    let recipients = match &args.age_recipients {
        Some(path) => encryption::parse_recipients_file(path)
            .context("failed to read encryption keys")?,
        None => Vec::new(),
    };

    let meta = Metadata {
        version: VERSION.to_string(),
        source: (!args.source.is_empty()).then(|| args.source.clone()),
        revision: (!args.revision.is_empty()).then(|| args.revision.clone()),
        ..Metadata::default()
    };

    let client = app.registry_client()?;
    logger::action(format!("pushing image {}", args.url));
    let digest = registry::push(&client, &args.url, yaml.as_bytes(), meta, &recipients)
        .await
        .context("pushing image failed")?;

    logger::success(format!("published digest {digest}"));
    println!("{digest}");
    Ok(())
}
