//! `kivo diff inventory <name>`: server-side dry-run of the desired set,
//! printing the drift and a prune preview.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use kivo_core::ObjectId;
use kivo_inventory::Inventory;
use kivo_resmgr::Action;

use crate::logger;
use crate::manifests;
use crate::App;

#[derive(Args, Debug)]
pub struct DiffArgs {
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

    /// Preview the objects that an apply with --prune would delete.
    #[arg(long)]
    pub prune: bool,
}

pub async fn run(app: &App, args: DiffArgs) -> Result<()> {
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

    let order = app.config.apply_order();
    let mut new_inventory = Inventory::new(&args.name, &app.namespace);
    new_inventory.add_objects(&objects, &order);

    let manager = app.resource_manager().await?;
    let storage = app.inventory_storage(&manager);

    manager.set_owner_labels(&mut objects, &args.name, &app.namespace);

    let mut invalid = false;
    for object in &objects {
        let (entry, _) = match manager.diff(object).await {
            Ok(result) => result,
            Err(e) => {
                logger::failure(e);
                invalid = true;
                continue;
            }
        };

        match entry.action {
            Action::Created => println!("► {} created", entry.subject),
            Action::Configured => {
                println!("► {} drifted", entry.subject);
                if let Some(diff) = &entry.diff {
                    // skip the ---/+++ header, the subject line already
                    // names both sides
                    for line in diff.lines().skip(2) {
                        println!("{line}");
                    }
                }
            }
            _ => {}
        }
    }

    if args.prune {
        let stale_objects = storage
            .stale_objects(&new_inventory)
            .await
            .context("inventory query failed")?;
        for object in &stale_objects {
            println!("► {} deleted", ObjectId::from_object(object));
        }
    }

    if invalid {
        bail!("one or more objects failed validation");
    }
    Ok(())
}
