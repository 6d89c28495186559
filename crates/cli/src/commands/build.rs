//! `kivo build inventory <name>`: render the desired set to stdout.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};

use kivo_core::codec::{objects_to_json, objects_to_yaml};

use crate::manifests;
use crate::App;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Output {
    Yaml,
    Json,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// The name of the inventory.
    pub name: String,

    /// Path to Kubernetes manifest(s). Directories are scanned
    /// recursively; use '-f -' to read from stdin.
    #[arg(short = 'f', long = "filename")]
    pub filename: Vec<PathBuf>,

    /// Path to a directory that contains a kustomization.yaml.
    #[arg(short = 'k', long = "kustomize")]
    pub kustomize: Option<PathBuf>,

    /// Artifact URL in the format 'oci://<registry>/<repo>:<tag>'.
    #[arg(short = 'a', long = "artifact")]
    pub artifact: Vec<String>,

    /// Path to a kustomization file that contains a list of patches.
    #[arg(short = 'p', long = "patch")]
    pub patch: Vec<PathBuf>,

    /// Write manifests to stdout in YAML or JSON format.
    #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Yaml)]
    pub output: Output,
}

pub async fn run(app: &App, args: BuildArgs) -> Result<()> {
    if args.kustomize.is_none() && args.filename.is_empty() && args.artifact.is_empty() {
        bail!("-f, -k or -a is required");
    }

    let mut objects = manifests::desired_set(
        app,
        args.kustomize.as_deref(),
        &args.filename,
        &args.artifact,
        &args.patch,
    )
    .await?;

    app.config.apply_order().sort_for_apply(&mut objects);

    match args.output {
        Output::Yaml => print!("{}", objects_to_yaml(&objects)?),
        Output::Json => println!("{}", objects_to_json(&objects)?),
    }
    Ok(())
}
