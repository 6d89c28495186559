//! `kivo apply inventory <name>`: build the desired set, reconcile it in
//! stages, record the inventory and prune what fell out of it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use kivo_inventory::Inventory;
use kivo_resmgr::fix_replicas_conflict;

use crate::logger;
use crate::manifests;
use crate::App;

#[derive(Args, Debug)]
pub struct ApplyArgs {
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

    /// Wait for the applied Kubernetes objects to become ready.
    #[arg(long)]
    pub wait: bool,

    /// Recreate objects that contain immutable field changes.
    #[arg(long)]
    pub force: bool,

    /// Delete stale objects from the cluster.
    #[arg(long)]
    pub prune: bool,

    /// The URL to the source code.
    #[arg(long, default_value = "")]
    pub source: String,

    /// The revision identifier.
    #[arg(long, default_value = "")]
    pub revision: String,
}

pub async fn run(app: &App, args: ApplyArgs) -> Result<()> {
    if args.kustomize.is_none() && args.filename.is_empty() && args.artifact.is_empty() {
        bail!("-f, -k or -a is required");
    }

    if args.artifact.is_empty() && !manifests::is_stdin(&args.filename) {
        logger::action("building inventory...");
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
    new_inventory.set_source(&args.source, &args.revision);
    new_inventory.add_objects(&objects, &order);

    logger::action(format!("applying {} manifest(s)...", objects.len()));

    fix_replicas_conflict(&mut objects);

    let manager = app.resource_manager().await?;
    let storage = app.inventory_storage(&manager);

    manager.set_owner_labels(&mut objects, &args.name, &app.namespace);
    storage
        .create_namespace(&app.namespace)
        .await
        .context("inventory namespace setup failed")?;

    let changeset = manager
        .apply_all_staged(&objects, args.force, app.timeout)
        .await?;
    for entry in &changeset.entries {
        logger::action(entry);
    }

    // the stored inventory is still the previous generation here; compute
    // the prune set before the new one is written or the objects leak
    let stale_objects = storage
        .stale_objects(&new_inventory)
        .await
        .context("inventory query failed")?;

    storage
        .apply_inventory(&new_inventory)
        .await
        .context("inventory apply failed")?;

    if args.prune && !stale_objects.is_empty() {
        let changeset = manager
            .delete_all(&stale_objects)
            .await
            .context("prune failed")?;
        for entry in &changeset.entries {
            logger::action(entry);
        }
    }

    if args.wait {
        logger::waiting("waiting for resources to become ready...");
        manager
            .wait(&objects, Duration::from_secs(2), app.timeout)
            .await?;

        if args.prune && !stale_objects.is_empty() {
            manager
                .wait_for_termination(&stale_objects, Duration::from_secs(2), app.timeout)
                .await
                .context("waiting for termination failed")?;
        }
        logger::success("all resources are ready");
    }

    Ok(())
}
