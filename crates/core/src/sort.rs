//! Total order over Kubernetes kinds used for apply (and, reversed, for
//! delete).

use std::cmp::Ordering;

use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};

use crate::objid::ObjectId;

/// Apply ordering: kinds in `first` are applied first (and deleted last),
/// kinds in `last` are applied last (and deleted first). Unlisted kinds
/// sort in a middle band. Ties always break by `(namespace, name)` so the
/// output order is deterministic irrespective of input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindOrder {
    pub first: Vec<String>,
    pub last: Vec<String>,
}

impl Default for KindOrder {
    fn default() -> Self {
        Self {
            first: [
                "CustomResourceDefinition",
                "Namespace",
                "ResourceQuota",
                "StorageClass",
                "ServiceAccount",
                "PodSecurityPolicy",
                "Role",
                "ClusterRole",
                "RoleBinding",
                "ClusterRoleBinding",
                "ConfigMap",
                "Secret",
                "Service",
                "LimitRange",
                "PriorityClass",
                "Deployment",
                "StatefulSet",
                "CronJob",
                "PodDisruptionBudget",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            last: ["MutatingWebhookConfiguration", "ValidatingWebhookConfiguration"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl KindOrder {
    /// Rank of a kind in the partial ordering: `first` kinds are negative,
    /// unlisted kinds are zero, `last` kinds are positive.
    pub fn rank(&self, kind: &str) -> isize {
        if let Some(i) = self.first.iter().position(|k| k == kind) {
            return i as isize - self.first.len() as isize;
        }
        if let Some(i) = self.last.iter().position(|k| k == kind) {
            return 1 + i as isize;
        }
        0
    }

    /// Compares two object identities in apply order.
    pub fn cmp_ids(&self, a: &ObjectId, b: &ObjectId) -> Ordering {
        if a.group != b.group || a.kind != b.kind {
            return self
                .rank(&a.kind)
                .cmp(&self.rank(&b.kind))
                .then_with(|| a.group.cmp(&b.group))
                .then_with(|| a.kind.cmp(&b.kind));
        }
        a.namespace
            .cmp(&b.namespace)
            .then_with(|| a.name.cmp(&b.name))
    }

    /// Sorts the objects in apply order.
    pub fn sort_for_apply(&self, objects: &mut [DynamicObject]) {
        objects.sort_by(|a, b| {
            self.cmp_ids(&ObjectId::from_object(a), &ObjectId::from_object(b))
        });
    }

    /// Sorts the objects in delete order, the strict reverse of apply order.
    pub fn sort_for_delete(&self, objects: &mut [DynamicObject]) {
        objects.sort_by(|a, b| {
            self.cmp_ids(&ObjectId::from_object(b), &ObjectId::from_object(a))
        });
    }
}

/// Kinds that define cluster capabilities and must exist before anything
/// that depends on them can be validated.
pub fn is_cluster_definition(kind: &str) -> bool {
    kind == "CustomResourceDefinition" || kind == "Namespace"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_objects;

    fn kinds(objects: &[DynamicObject]) -> Vec<String> {
        objects
            .iter()
            .map(|o| o.types.as_ref().unwrap().kind.clone())
            .collect()
    }

    const MIXED: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
---
apiVersion: admissionregistration.k8s.io/v1
kind: ValidatingWebhookConfiguration
metadata:
  name: gate
---
apiVersion: v1
kind: Namespace
metadata:
  name: demo
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
---
apiVersion: example.com/v1
kind: Widget
metadata:
  name: widget-a
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
"#;

    #[test]
    fn applies_in_kind_order() {
        let mut objects = read_objects(MIXED).unwrap();
        KindOrder::default().sort_for_apply(&mut objects);
        assert_eq!(
            kinds(&objects),
            vec![
                "CustomResourceDefinition",
                "Namespace",
                "ConfigMap",
                "Deployment",
                "Widget",
                "ValidatingWebhookConfiguration",
            ]
        );
    }

    #[test]
    fn delete_order_is_the_strict_reverse() {
        let mut forward = read_objects(MIXED).unwrap();
        let mut backward = read_objects(MIXED).unwrap();
        let order = KindOrder::default();
        order.sort_for_apply(&mut forward);
        order.sort_for_delete(&mut backward);
        forward.reverse();
        assert_eq!(kinds(&forward), kinds(&backward));
    }

    #[test]
    fn ties_break_by_namespace_then_name() {
        let order = KindOrder::default();
        let a = ObjectId::new("", "ConfigMap", "a-ns", "zz");
        let b = ObjectId::new("", "ConfigMap", "b-ns", "aa");
        assert_eq!(order.cmp_ids(&a, &b), Ordering::Less);

        let c = ObjectId::new("", "ConfigMap", "a-ns", "aa");
        assert_eq!(order.cmp_ids(&c, &a), Ordering::Less);
    }

    #[test]
    fn custom_order_preserves_tie_break() {
        let order = KindOrder {
            first: vec!["Service".into()],
            last: vec![],
        };
        let svc = ObjectId::new("", "Service", "ns", "b");
        let cm = ObjectId::new("", "ConfigMap", "ns", "a");
        assert_eq!(order.cmp_ids(&svc, &cm), Ordering::Less);

        let svc2 = ObjectId::new("", "Service", "ns", "a");
        assert_eq!(order.cmp_ids(&svc2, &svc), Ordering::Less);
    }

    #[test]
    fn cluster_definitions() {
        assert!(is_cluster_definition("CustomResourceDefinition"));
        assert!(is_cluster_definition("Namespace"));
        assert!(!is_cluster_definition("ConfigMap"));
    }
}
