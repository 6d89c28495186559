//! `kivo tag artifact <oci-url> <tag>`: alias an existing artifact.

use anyhow::{Context, Result};
use clap::Args;

use kivo_registry as registry;

use crate::logger;
use crate::App;

#[derive(Args, Debug)]
pub struct TagArgs {
    /// Artifact URL in the format 'oci://<registry>/<repo>:<tag>'.
    pub url: String,

    /// The new tag.
    pub tag: String,
}

pub async fn run(app: &App, args: TagArgs) -> Result<()> {
    let client = app.registry_client()?;
    let result = registry::tag(&client, &args.url, &args.tag)
        .await
        .with_context(|| format!("tagging {} failed", args.url))?;
    logger::success(format!("tagged {result}"));
    Ok(())
}
