//! `kivo delete inventory <name>`: delete the tracked objects in reverse
//! apply order, then the inventory storage itself.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;

use crate::logger;
use crate::App;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// The name of the inventory.
    pub name: String,

    /// Wait for the deleted Kubernetes objects to be terminated.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub wait: bool,
}

pub async fn run(app: &App, args: DeleteArgs) -> Result<()> {
    logger::action("retrieving inventory...");

    let manager = app.resource_manager().await?;
    let storage = app.inventory_storage(&manager);
    let order = app.config.apply_order();

    let inventory = storage.get_inventory(&args.name, &app.namespace).await?;
    let mut objects = inventory.list_objects(&order)?;

    logger::action(format!("deleting {} manifest(s)...", objects.len()));

    // per-object failures do not stop the batch; the exit code reports them
    let mut has_errors = false;
    order.sort_for_delete(&mut objects);
    for object in &objects {
        match manager.delete(object).await {
            Ok(entry) => logger::action(entry),
            Err(e) => {
                logger::failure(e);
                has_errors = true;
            }
        }
    }
    if has_errors {
        bail!("failed to delete all objects");
    }

    storage.delete_inventory(&args.name, &app.namespace).await?;
    logger::action(format!(
        "ConfigMap/{}/inv-{} deleted",
        app.namespace, args.name
    ));

    if args.wait {
        logger::waiting("waiting for resources to be terminated...");
        manager
            .wait_for_termination(&objects, Duration::from_secs(2), app.timeout)
            .await?;
        logger::success("all resources have been deleted");
    }

    Ok(())
}
