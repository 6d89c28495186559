//! Object identity: the `(group, kind, namespace, name)` tuple that addresses
//! a Kubernetes object independently of its API version.

use std::fmt;

use kube::core::DynamicObject;

use crate::{Error, Result};

/// Identity of a cluster object. Cluster-scoped objects carry an empty
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectId {
    pub fn new(group: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Extracts the identity from an unstructured object.
    pub fn from_object(obj: &DynamicObject) -> Self {
        let (group, kind) = match &obj.types {
            Some(t) => (api_group(&t.api_version).to_string(), t.kind.clone()),
            None => (String::new(), String::new()),
        };
        Self {
            group,
            kind,
            namespace: obj.metadata.namespace.clone().unwrap_or_default(),
            name: obj.metadata.name.clone().unwrap_or_default(),
        }
    }

    /// The `<namespace>_<name>_<group>_<kind>` form used by the inventory
    /// records. Kubernetes names cannot contain underscores, so the join is
    /// unambiguous.
    pub fn inventory_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.namespace, self.name, self.group, self.kind
        )
    }

    /// Parses the inventory form back into an identity.
    pub fn parse_inventory_id(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('_').collect();
        if parts.len() != 4 || parts[1].is_empty() || parts[3].is_empty() {
            return Err(Error::InvalidObjectId(s.to_string()));
        }
        Ok(Self::new(parts[2], parts[3], parts[0], parts[1]))
    }
}

impl fmt::Display for ObjectId {
    /// `Kind/namespace/name`, with the namespace segment omitted for
    /// cluster-scoped objects.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// The group half of an `apiVersion` string, empty for the core group.
pub fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

/// The version half of an `apiVersion` string.
pub fn api_version_of(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((_, version)) => version,
        None => api_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_namespaced_and_cluster_scoped() {
        let id = ObjectId::new("apps", "Deployment", "prod", "web");
        assert_eq!(id.to_string(), "Deployment/prod/web");

        let id = ObjectId::new("", "Namespace", "", "prod");
        assert_eq!(id.to_string(), "Namespace/prod");
    }

    #[test]
    fn inventory_id_round_trips() {
        let id = ObjectId::new("apps", "Deployment", "prod", "web");
        assert_eq!(id.inventory_id(), "prod_web_apps_Deployment");
        assert_eq!(ObjectId::parse_inventory_id("prod_web_apps_Deployment").unwrap(), id);

        let id = ObjectId::new("", "ClusterRole", "", "admin");
        assert_eq!(id.inventory_id(), "_admin__ClusterRole");
        assert_eq!(ObjectId::parse_inventory_id("_admin__ClusterRole").unwrap(), id);
    }

    #[test]
    fn rejects_malformed_inventory_ids() {
        assert!(ObjectId::parse_inventory_id("only_three_parts").is_err());
        assert!(ObjectId::parse_inventory_id("ns__group_").is_err());
    }

    #[test]
    fn splits_api_version() {
        assert_eq!(api_group("apps/v1"), "apps");
        assert_eq!(api_group("v1"), "");
        assert_eq!(api_version_of("apps/v1"), "v1");
        assert_eq!(api_version_of("v1"), "v1");
    }
}
