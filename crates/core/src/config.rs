//! Process-wide configuration, loaded once at startup from
//! `$HOME/.kivo/config` and treated as immutable afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{sort::KindOrder, Error, Result};

pub const CONFIG_API_VERSION: &str = "kivo.dev/v1";
pub const CONFIG_KIND: &str = "Config";

pub const DEFAULT_FIELD_MANAGER: &str = "kivo";
pub const DEFAULT_FIELD_GROUP: &str = "inventory.kivo.dev";

/// Server-side-apply identity. `field` is the field-manager name recorded
/// on every field written by SSA; `group` is the label and annotation
/// domain used for ownership labels and inventory metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub field: String,
    pub group: String,
}

impl Default for Owner {
    fn default() -> Self {
        Self {
            field: DEFAULT_FIELD_MANAGER.to_string(),
            group: DEFAULT_FIELD_GROUP.to_string(),
        }
    }
}

fn default_api_version() -> String {
    CONFIG_API_VERSION.to_string()
}

fn default_kind() -> String {
    CONFIG_KIND.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldManager {
    name: String,
    group: String,
}

/// The on-disk configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    apply_order: Option<KindOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_manager: Option<FieldManager>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_version: CONFIG_API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            apply_order: Some(KindOrder::default()),
            field_manager: Some(FieldManager {
                name: DEFAULT_FIELD_MANAGER.to_string(),
                group: DEFAULT_FIELD_GROUP.to_string(),
            }),
        }
    }
}

impl Config {
    pub fn apply_order(&self) -> KindOrder {
        self.apply_order.clone().unwrap_or_default()
    }

    pub fn owner(&self) -> Owner {
        match &self.field_manager {
            Some(fm) => Owner {
                field: fm.name.clone(),
                group: fm.group.clone(),
            },
            None => Owner::default(),
        }
    }

    /// `$HOME/.kivo/config` (`%USERPROFILE%` on Windows).
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| Error::Config("$HOME dir can't be determined".to_string()))?;
        Ok(PathBuf::from(home).join(".kivo").join("config"))
    }

    /// Loads the config from the given path, falling back to the default
    /// path, then to built-in defaults when no file exists.
    pub fn read(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let mut cfg: Config = serde_yaml::from_str(&data)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;

        if cfg.apply_order.is_none() {
            cfg.apply_order = Some(KindOrder::default());
        }
        match &cfg.field_manager {
            None => {
                cfg.field_manager = Some(FieldManager {
                    name: DEFAULT_FIELD_MANAGER.to_string(),
                    group: DEFAULT_FIELD_GROUP.to_string(),
                });
            }
            Some(fm) if fm.name.is_empty() => {
                return Err(Error::Config("the field manager name can't be empty".into()));
            }
            Some(fm) if fm.group.is_empty() => {
                return Err(Error::Config("the field manager group can't be empty".into()));
            }
            Some(_) => {}
        }

        Ok(cfg)
    }

    /// Writes the config, creating parent directories as needed.
    pub fn write(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("creating {}: {e}", dir.display())))?;
        }
        let data = serde_yaml::to_string(self).map_err(|e| Error::Serialize(e.to_string()))?;
        fs::write(&path, data)
            .map_err(|e| Error::Config(format!("writing {}: {e}", path.display())))?;
        Ok(path)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.owner().field, "kivo");
        assert_eq!(cfg.owner().group, "inventory.kivo.dev");
        assert!(cfg.apply_order().first.contains(&"Namespace".to_string()));
    }

    #[test]
    fn parses_partial_config() {
        let cfg: Config = serde_yaml::from_str(
            r#"
apiVersion: kivo.dev/v1
kind: Config
applyOrder:
  first: ["Namespace"]
  last: ["ValidatingWebhookConfiguration"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.apply_order().first, vec!["Namespace".to_string()]);
        // missing field manager falls back to defaults on read path
        assert_eq!(cfg.owner().field, "kivo");
    }

    #[test]
    fn rejects_empty_field_manager() {
        let dir = std::env::temp_dir().join("kivo-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config");
        fs::write(
            &path,
            "apiVersion: kivo.dev/v1\nkind: Config\nfieldManager:\n  name: \"\"\n  group: g\n",
        )
        .unwrap();
        assert!(Config::read(Some(&path)).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = Config::default();
        let yaml = cfg.to_yaml().unwrap();
        let again: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg, again);
    }
}
