//! Multi-doc YAML/JSON codec for unstructured cluster objects.

use kube::core::DynamicObject;
use serde::Deserialize;
use serde_json::Value;

use crate::{objid::api_group, Error, Result};

/// Decodes a stream of YAML or JSON documents into unstructured objects.
///
/// `List` documents are flattened into their items. Documents that are not
/// addressable cluster objects (or that are Kustomize control documents) are
/// discarded. An empty stream yields an empty set.
pub fn read_objects(input: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for (pos, doc) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let value = Value::deserialize(doc).map_err(|e| Error::InvalidDocument {
            pos,
            reason: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }

        if is_list(&value) {
            let items = value
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for item in items {
                objects.push(to_object(item, pos)?);
            }
            continue;
        }

        let obj = to_object(value, pos)?;
        if is_kubernetes_object(&obj) && !is_kustomization(&obj) {
            objects.push(obj);
        }
    }

    Ok(objects)
}

fn to_object(value: Value, pos: usize) -> Result<DynamicObject> {
    serde_json::from_value(value).map_err(|e| Error::InvalidDocument {
        pos,
        reason: e.to_string(),
    })
}

fn is_list(value: &Value) -> bool {
    value
        .get("kind")
        .and_then(Value::as_str)
        .map(|k| k.ends_with("List"))
        .unwrap_or(false)
        && value.get("items").map(Value::is_array).unwrap_or(false)
}

/// An object is addressable on a cluster iff apiVersion, kind and name are
/// all non-empty.
pub fn is_kubernetes_object(obj: &DynamicObject) -> bool {
    let typed = match &obj.types {
        Some(t) => !t.api_version.is_empty() && !t.kind.is_empty(),
        None => false,
    };
    typed && obj.metadata.name.as_deref().map(|n| !n.is_empty()).unwrap_or(false)
}

/// Kustomize overlay control documents are inputs to the renderer, never
/// cluster objects.
pub fn is_kustomization(obj: &DynamicObject) -> bool {
    match &obj.types {
        Some(t) => t.kind == "Kustomization" && api_group(&t.api_version) == "kustomize.config.k8s.io",
        None => false,
    }
}

/// Encodes the given objects as a multi-doc YAML, each document terminated
/// by a `---` separator.
pub fn objects_to_yaml(objects: &[DynamicObject]) -> Result<String> {
    let mut out = String::new();
    for obj in objects {
        let doc = serde_yaml::to_string(obj).map_err(|e| Error::Serialize(e.to_string()))?;
        out.push_str(&doc);
        out.push_str("---\n");
    }
    Ok(out)
}

/// Encodes the given objects as a single JSON `v1/List`.
pub fn objects_to_json(objects: &[DynamicObject]) -> Result<String> {
    let list = serde_json::json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": objects,
    });
    serde_json::to_string_pretty(&list).map_err(|e| Error::Serialize(e.to_string()))
}

/// Returns a copy of the given Secret with every `data` value replaced by
/// the mask. Used for diff and validation output only.
pub fn mask_secret(obj: &DynamicObject, mask: &str) -> DynamicObject {
    let mut masked = obj.clone();
    if let Some(data) = masked.data.get_mut("data").and_then(Value::as_object_mut) {
        for value in data.values_mut() {
            *value = Value::String(mask.to_string());
        }
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI_DOC: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  namespace: demo
data:
  key: value
---
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
resources:
  - deployment.yaml
---
# a comment-only document
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: demo
spec:
  replicas: 2
"#;

    #[test]
    fn decodes_and_filters_documents() {
        let objects = read_objects(MULTI_DOC).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "ConfigMap");
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "Deployment");
    }

    #[test]
    fn flattens_lists() {
        let list = r#"
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: ServiceAccount
    metadata:
      name: runner
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: runner-env
"#;
        let objects = read_objects(list).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "ServiceAccount");
    }

    #[test]
    fn empty_stream_is_not_an_error() {
        assert!(read_objects("").unwrap().is_empty());
        assert!(read_objects("---\n---\n").unwrap().is_empty());
    }

    #[test]
    fn parse_failures_carry_position() {
        let err = read_objects("apiVersion: v1\nkind: [not\n").unwrap_err();
        match err {
            Error::InvalidDocument { pos, .. } => assert_eq!(pos, 0),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn yaml_round_trip_is_stable() {
        let objects = read_objects(MULTI_DOC).unwrap();
        let yaml = objects_to_yaml(&objects).unwrap();
        let again = read_objects(&yaml).unwrap();
        assert_eq!(objects_to_yaml(&again).unwrap(), yaml);
    }

    #[test]
    fn json_output_is_a_list() {
        let objects = read_objects(MULTI_DOC).unwrap();
        let json = objects_to_json(&objects).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kind"], "List");
        assert_eq!(value["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn masks_secret_data() {
        let secret = read_objects(
            r#"
apiVersion: v1
kind: Secret
metadata:
  name: creds
data:
  password: aHVudGVyMg==
"#,
        )
        .unwrap()
        .remove(0);
        let masked = mask_secret(&secret, "******");
        assert_eq!(masked.data["data"]["password"], "******");
        // the original is left untouched
        assert_eq!(secret.data["data"]["password"], "aHVudGVyMg==");
    }
}
