//! ConfigMap-backed persistence for inventories.
//!
//! The storage object for inventory `x` is the ConfigMap `inv-x` in the
//! inventory namespace, holding the JSON-encoded entries under
//! `data.inventory` and the bookkeeping annotations under the owner's
//! label domain.

use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::core::DynamicObject;
use tracing::debug;

use kivo_core::{KindOrder, Owner};
use kivo_resmgr::ClusterClient;

use crate::{Entry, Error, Inventory, Result};

pub const INVENTORY_PREFIX: &str = "inv-";
pub const INVENTORY_DATA_KEY: &str = "inventory";

const NAME_LABEL: &str = "app.kubernetes.io/name";
const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
const CREATED_BY_LABEL: &str = "app.kubernetes.io/created-by";

pub struct InventoryStorage {
    client: ClusterClient,
    owner: Owner,
    order: KindOrder,
}

impl InventoryStorage {
    pub fn new(client: ClusterClient, owner: Owner, order: KindOrder) -> Self {
        Self { client, owner, order }
    }

    fn storage_name(name: &str) -> String {
        format!("{INVENTORY_PREFIX}{name}")
    }

    fn configmaps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.kube_client(), namespace)
    }

    /// Upserts the storage ConfigMap for the given inventory using
    /// server-side apply with forced ownership.
    pub async fn apply_inventory(&self, inv: &Inventory) -> Result<()> {
        let data = serde_json::to_string(&inv.entries)
            .map_err(|e| Error::Malformed { name: inv.name.clone(), reason: e.to_string() })?;

        let mut annotations = serde_json::Map::new();
        annotations.insert(
            format!("{}/last-applied-time", self.owner.group),
            Utc::now()
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .into(),
        );
        if let Some(source) = &inv.source {
            annotations.insert(format!("{}/source", self.owner.group), source.clone().into());
        }
        if let Some(revision) = &inv.revision {
            annotations.insert(format!("{}/revision", self.owner.group), revision.clone().into());
        }

        let cm = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": Self::storage_name(&inv.name),
                "namespace": inv.namespace,
                "labels": {
                    NAME_LABEL: inv.name,
                    COMPONENT_LABEL: INVENTORY_DATA_KEY,
                    CREATED_BY_LABEL: self.owner.field,
                },
                "annotations": annotations,
            },
            "data": { INVENTORY_DATA_KEY: data },
        });

        self.configmaps(&inv.namespace)
            .patch(
                &Self::storage_name(&inv.name),
                &PatchParams::apply(&self.owner.field).force(),
                &Patch::Apply(&cm),
            )
            .await
            .map(|_| ())
            .map_err(|e| Error::Transport { op: "inventory apply".into(), source: e })
    }

    /// Fetches and deserializes the inventory under the given name and
    /// namespace.
    pub async fn get_inventory(&self, name: &str, namespace: &str) -> Result<Inventory> {
        let cm = self
            .configmaps(namespace)
            .get(&Self::storage_name(name))
            .await
            .map_err(|e| match &e {
                kube::Error::Api(ae) if ae.code == 404 => Error::NotFound {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                },
                _ => Error::Transport { op: "inventory get".into(), source: e },
            })?;

        self.inventory_from_configmap(name, namespace, &cm)
    }

    fn inventory_from_configmap(
        &self,
        name: &str,
        namespace: &str,
        cm: &ConfigMap,
    ) -> Result<Inventory> {
        let storage_name = Self::storage_name(name);
        let raw = cm
            .data
            .as_ref()
            .and_then(|d| d.get(INVENTORY_DATA_KEY))
            .ok_or_else(|| Error::Malformed {
                name: storage_name.clone(),
                reason: format!("'{INVENTORY_DATA_KEY}' key not found"),
            })?;

        let entries: Vec<Entry> = serde_json::from_str(raw).map_err(|e| Error::Malformed {
            name: storage_name,
            reason: e.to_string(),
        })?;

        let mut inv = Inventory::new(name, namespace);
        inv.entries = entries;
        if let Some(annotations) = &cm.metadata.annotations {
            inv.source = annotations
                .get(&format!("{}/source", self.owner.group))
                .cloned();
            inv.revision = annotations
                .get(&format!("{}/revision", self.owner.group))
                .cloned();
            inv.last_applied = annotations
                .get(&format!("{}/last-applied-time", self.owner.group))
                .cloned();
        }
        Ok(inv)
    }

    /// Removes the storage ConfigMap. Deleting a never-created inventory
    /// succeeds.
    pub async fn delete_inventory(&self, name: &str, namespace: &str) -> Result<()> {
        match self
            .configmaps(namespace)
            .delete(&Self::storage_name(name), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::Transport { op: "inventory delete".into(), source: e }),
        }
    }

    /// Returns the objects subject to pruning: tracked by the stored
    /// generation under the same name and namespace, absent from
    /// `new_inv`. Must be called before `apply_inventory(new_inv)` — once
    /// the new generation is stored the stale set reads as empty and the
    /// objects leak.
    pub async fn stale_objects(&self, new_inv: &Inventory) -> Result<Vec<DynamicObject>> {
        let existing = match self.get_inventory(&new_inv.name, &new_inv.namespace).await {
            Ok(inv) => inv,
            Err(Error::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        existing.diff(new_inv, &self.order)
    }

    /// Lists the inventories in the given namespace (or everywhere when
    /// `namespace` is `None`), selected by the component and created-by
    /// labels.
    pub async fn list_inventories(&self, namespace: Option<&str>) -> Result<Vec<Inventory>> {
        let api: Api<ConfigMap> = match namespace {
            Some(ns) => Api::namespaced(self.client.kube_client(), ns),
            None => Api::all(self.client.kube_client()),
        };
        let selector = format!(
            "{COMPONENT_LABEL}={INVENTORY_DATA_KEY},{CREATED_BY_LABEL}={}",
            self.owner.field
        );
        let list = api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::Transport { op: "inventory list".into(), source: e })?;

        let mut inventories = Vec::with_capacity(list.items.len());
        for cm in &list.items {
            let cm_name = cm.metadata.name.clone().unwrap_or_default();
            let name = cm
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(NAME_LABEL).cloned())
                .unwrap_or_else(|| {
                    cm_name
                        .strip_prefix(INVENTORY_PREFIX)
                        .unwrap_or(&cm_name)
                        .to_string()
                });
            let ns = cm.metadata.namespace.clone().unwrap_or_default();
            match self.inventory_from_configmap(&name, &ns, cm) {
                Ok(inv) => inventories.push(inv),
                Err(e) => debug!(configmap = %cm_name, error = %e, "skipping malformed inventory"),
            }
        }
        Ok(inventories)
    }

    /// Ensures the inventory namespace exists, creating it with SSA when
    /// absent.
    pub async fn create_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.kube_client());
        match api.get_opt(name).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                let ns = serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "Namespace",
                    "metadata": {
                        "name": name,
                        "labels": { CREATED_BY_LABEL: self.owner.field },
                    },
                });
                api.patch(
                    name,
                    &PatchParams::apply(&self.owner.field).force(),
                    &Patch::Apply(&ns),
                )
                .await
                .map(|_| ())
                .map_err(|e| Error::Transport { op: "namespace apply".into(), source: e })
            }
            Err(e) => Err(Error::Transport { op: "namespace get".into(), source: e }),
        }
    }
}
