//! `kivo get inventories`: table of inventories in a namespace.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets, Table};

use crate::App;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// List inventories across all namespaces.
    #[arg(long = "all-namespaces", short = 'A')]
    pub all_namespaces: bool,
}

pub async fn run(app: &App, args: GetArgs) -> Result<()> {
    let manager = app.resource_manager().await?;
    let storage = app.inventory_storage(&manager);

    let namespace = if args.all_namespaces {
        None
    } else {
        Some(app.namespace.as_str())
    };
    let inventories = storage.list_inventories(namespace).await?;

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    if args.all_namespaces {
        table.set_header(vec!["NAMESPACE", "NAME", "ENTRIES", "SOURCE", "REVISION", "LAST APPLIED"]);
    } else {
        table.set_header(vec!["NAME", "ENTRIES", "SOURCE", "REVISION", "LAST APPLIED"]);
    }

    for inv in &inventories {
        let mut row = vec![
            inv.name.clone(),
            inv.entries.len().to_string(),
            inv.source.clone().unwrap_or_default(),
            inv.revision.clone().unwrap_or_default(),
            inv.last_applied.clone().unwrap_or_default(),
        ];
        if args.all_namespaces {
            row.insert(0, inv.namespace.clone());
        }
        table.add_row(row);
    }

    println!("{table}");
    Ok(())
}
