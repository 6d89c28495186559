//! `kivo list artifacts <oci-repo>`: enumerate artifact versions.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets, Table};

use kivo_registry::{self as registry, parse_repository_url};

use crate::App;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Repository URL in the format 'oci://<registry>/<repo>'.
    pub url: String,

    /// Filter the results based on a semantic version constraint,
    /// e.g. '>=1.0.0'.
    #[arg(long)]
    pub semver: Option<String>,
}

pub async fn run(app: &App, args: ListArgs) -> Result<()> {
    let repo = parse_repository_url(&args.url)?;
    let client = app.registry_client()?;
    let tags = registry::list_tags(&client, &args.url)
        .await
        .with_context(|| format!("listing {} failed", args.url))?;

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec!["VERSION", "URL"]);

    match &args.semver {
        Some(expr) => {
            for m in registry::filter_semver(&tags, expr)? {
                table.add_row(vec![m.version.to_string(), format!("{repo}:{}", m.tag)]);
            }
        }
        None => {
            for tag in &tags {
                table.add_row(vec![tag.clone(), format!("{repo}:{tag}")]);
            }
        }
    }

    println!("{table}");
    Ok(())
}
