//! `kivo config init|view`: manage the config file.

use anyhow::Result;

use kivo_core::Config;

use crate::logger;
use crate::{App, ConfigCmd};

pub async fn run(app: &App, cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Init => {
            let path = Config::default().write(None)?;
            logger::success(format!("config written to {}", path.display()));
        }
        ConfigCmd::View => {
            print!("{}", app.config.to_yaml()?);
        }
    }
    Ok(())
}
