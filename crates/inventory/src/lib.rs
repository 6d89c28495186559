//! In-memory inventory: the record of object identities and API versions
//! owned by a named configuration.

#![forbid(unsafe_code)]

pub mod storage;

pub use storage::InventoryStorage;

use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kivo_core::objid::api_version_of;
use kivo_core::{KindOrder, ObjectId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("inventory {namespace}/{name} not found")]
    NotFound { name: String, namespace: String },

    #[error("inventory data malformed in ConfigMap/{name}: {reason}")]
    Malformed { name: String, reason: String },

    #[error(transparent)]
    Core(#[from] kivo_core::Error),

    #[error("{op} failed, error: {source}")]
    Transport {
        op: String,
        #[source]
        source: kube::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// One tracked object: its identity plus the API version it was applied
/// under. The version is recorded at apply time so the object stays
/// addressable at prune time even if the cluster has since promoted or
/// deprecated the kind's storage version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub ver: String,
}

/// A named, namespaced record of applied objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub name: String,
    pub namespace: String,
    pub source: Option<String>,
    pub revision: Option<String>,
    pub last_applied: Option<String>,
    pub entries: Vec<Entry>,
}

impl Inventory {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    pub fn set_source(&mut self, source: &str, revision: &str) {
        if !source.is_empty() {
            self.source = Some(source.to_string());
        }
        if !revision.is_empty() {
            self.revision = Some(revision.to_string());
        }
    }

    /// Replaces the entries with the identities of the given objects,
    /// deduplicated and sorted in apply order so that serialized output is
    /// deterministic.
    pub fn add_objects(&mut self, objects: &[DynamicObject], order: &KindOrder) {
        let mut sorted = objects.to_vec();
        order.sort_for_apply(&mut sorted);

        self.entries.clear();
        for obj in &sorted {
            let id = ObjectId::from_object(obj);
            let ver = obj
                .types
                .as_ref()
                .map(|t| api_version_of(&t.api_version).to_string())
                .unwrap_or_default();
            let entry = Entry { id: id.inventory_id(), ver };
            if !self.entries.contains(&entry) {
                self.entries.push(entry);
            }
        }
    }

    /// The API version of the given object if tracked by this inventory.
    pub fn version_of(&self, id: &ObjectId) -> Option<&str> {
        let key = id.inventory_id();
        self.entries
            .iter()
            .find(|e| e.id == key)
            .map(|e| e.ver.as_str())
    }

    /// Reconstructs thin objects carrying only identity and GVK, for
    /// querying or deleting on the cluster when the full spec is unknown.
    pub fn list_objects(&self, order: &KindOrder) -> Result<Vec<DynamicObject>> {
        let mut objects = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let id = ObjectId::parse_inventory_id(&entry.id)?;
            objects.push(thin_object(&id, &entry.ver));
        }
        order.sort_for_apply(&mut objects);
        Ok(objects)
    }

    /// Set difference: objects tracked here but absent from `target`, i.e.
    /// the stale objects once `target` becomes the new generation. API
    /// versions come from `self`, the inventory the objects were created
    /// under.
    pub fn diff(&self, target: &Inventory, order: &KindOrder) -> Result<Vec<DynamicObject>> {
        let mut objects = Vec::new();
        for entry in &self.entries {
            if target.entries.iter().any(|e| e.id == entry.id) {
                continue;
            }
            let id = ObjectId::parse_inventory_id(&entry.id)?;
            objects.push(thin_object(&id, &entry.ver));
        }
        order.sort_for_apply(&mut objects);
        Ok(objects)
    }
}

fn thin_object(id: &ObjectId, version: &str) -> DynamicObject {
    let api_version = if id.group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", id.group, version)
    };
    DynamicObject {
        types: Some(kube::core::TypeMeta {
            api_version,
            kind: id.kind.clone(),
        }),
        metadata: kube::core::ObjectMeta {
            name: Some(id.name.clone()),
            namespace: (!id.namespace.is_empty()).then(|| id.namespace.clone()),
            ..Default::default()
        },
        data: serde_json::Value::Object(Default::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kivo_core::codec::read_objects;

    fn sample_objects() -> Vec<DynamicObject> {
        read_objects(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: demo
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  namespace: demo
---
apiVersion: v1
kind: Secret
metadata:
  name: creds
  namespace: demo
"#,
        )
        .unwrap()
    }

    #[test]
    fn records_sorted_entries() {
        let mut inv = Inventory::new("app", "demo");
        inv.add_objects(&sample_objects(), &KindOrder::default());
        let ids: Vec<&str> = inv.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "demo_app-config__ConfigMap",
                "demo_creds__Secret",
                "demo_web_apps_Deployment",
            ]
        );
        assert_eq!(inv.entries[2].ver, "v1");
    }

    #[test]
    fn add_objects_deduplicates() {
        let mut objects = sample_objects();
        objects.extend(sample_objects());
        let mut inv = Inventory::new("app", "demo");
        inv.add_objects(&objects, &KindOrder::default());
        assert_eq!(inv.entries.len(), 3);
    }

    #[test]
    fn version_lookup() {
        let mut inv = Inventory::new("app", "demo");
        inv.add_objects(&sample_objects(), &KindOrder::default());
        let id = ObjectId::new("apps", "Deployment", "demo", "web");
        assert_eq!(inv.version_of(&id), Some("v1"));
        let missing = ObjectId::new("", "Service", "demo", "web");
        assert_eq!(inv.version_of(&missing), None);
    }

    #[test]
    fn list_objects_round_trips_identities() {
        let mut inv = Inventory::new("app", "demo");
        inv.add_objects(&sample_objects(), &KindOrder::default());
        let objects = inv.list_objects(&KindOrder::default()).unwrap();
        assert_eq!(objects.len(), 3);
        assert_eq!(
            objects[2].types.as_ref().unwrap().api_version,
            "apps/v1"
        );
        assert_eq!(objects[2].metadata.name.as_deref(), Some("web"));
        assert_eq!(objects[2].metadata.namespace.as_deref(), Some("demo"));
    }

    #[test]
    fn diff_returns_stale_objects_with_source_versions() {
        let order = KindOrder::default();
        let mut old = Inventory::new("app", "demo");
        old.add_objects(&sample_objects(), &order);

        // the Secret leaves the desired set
        let remaining: Vec<DynamicObject> = sample_objects()
            .into_iter()
            .filter(|o| o.types.as_ref().unwrap().kind != "Secret")
            .collect();
        let mut new = Inventory::new("app", "demo");
        new.add_objects(&remaining, &order);

        let stale = old.diff(&new, &order).unwrap();
        assert_eq!(stale.len(), 1);
        let id = ObjectId::from_object(&stale[0]);
        assert_eq!(id.kind, "Secret");
        assert_eq!(id.name, "creds");
        assert_eq!(stale[0].types.as_ref().unwrap().api_version, "v1");

        // nothing stale in the other direction
        assert!(new.diff(&old, &order).unwrap().len() <= old.entries.len());
        assert!(new.diff(&new, &order).unwrap().is_empty());
    }

    #[test]
    fn entry_json_uses_short_field_names() {
        let entry = Entry { id: "demo_web_apps_Deployment".into(), ver: "v1".into() };
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"id":"demo_web_apps_Deployment","ver":"v1"}"#
        );
    }
}
