//! `kivo inspect inventory <name>`: print one inventory in detail.

use anyhow::Result;
use clap::Args;

use kivo_core::ObjectId;

use crate::App;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// The name of the inventory.
    pub name: String,
}

pub async fn run(app: &App, args: InspectArgs) -> Result<()> {
    let manager = app.resource_manager().await?;
    let storage = app.inventory_storage(&manager);

    let inventory = storage.get_inventory(&args.name, &app.namespace).await?;

    println!("Inventory: {}/{}", inventory.namespace, inventory.name);
    if let Some(source) = &inventory.source {
        println!("Source: {source}");
    }
    if let Some(revision) = &inventory.revision {
        println!("Revision: {revision}");
    }
    if let Some(last_applied) = &inventory.last_applied {
        println!("LastAppliedTime: {last_applied}");
    }
    println!("Entries:");
    for entry in &inventory.entries {
        println!("- {}", ObjectId::parse_inventory_id(&entry.id)?);
    }
    Ok(())
}
