//! Drift detection: the dry-run merge result is compared against the live
//! object with subset semantics, mirroring the server's own notion of
//! "nothing to do".

use kube::core::DynamicObject;
use serde_json::Value;

/// True when the dry-run result differs from the live object in a way that
/// warrants a real apply. An absent resourceVersion on the dry-run object
/// unconditionally means drift (new object).
pub fn has_drifted(live: &DynamicObject, dry_run: &DynamicObject) -> bool {
    if dry_run
        .metadata
        .resource_version
        .as_deref()
        .unwrap_or_default()
        .is_empty()
    {
        return true;
    }

    let dry_labels = meta_map(dry_run, "labels");
    let live_labels = meta_map(live, "labels");
    if !is_subset(&dry_labels, &live_labels) {
        return true;
    }

    let dry_annotations = meta_map(dry_run, "annotations");
    let live_annotations = meta_map(live, "annotations");
    if !is_subset(&dry_annotations, &live_annotations) {
        return true;
    }

    let live_body = body(live);
    let dry_body = body(dry_run);

    if let Some(live_spec) = live_body.get("spec") {
        return !is_subset(dry_body.get("spec").unwrap_or(&Value::Null), live_spec);
    }
    if let Some(live_webhooks) = live_body.get("webhooks") {
        return !is_subset(dry_body.get("webhooks").unwrap_or(&Value::Null), live_webhooks);
    }
    !is_subset(&dry_body, &live_body)
}

fn meta_map(obj: &DynamicObject, which: &str) -> Value {
    let map = match which {
        "labels" => obj.metadata.labels.as_ref(),
        _ => obj.metadata.annotations.as_ref(),
    };
    match map {
        Some(m) => serde_json::to_value(m).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn body(obj: &DynamicObject) -> Value {
    obj.data.clone()
}

/// Structural subset: every non-null field of `expected` must be present
/// and equal (recursively) in `actual`. Arrays must match element-wise.
/// A null or absent expected value always matches.
pub fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Null, _) => true,
        (Value::Object(exp), Value::Object(act)) => exp.iter().all(|(k, v)| {
            if v.is_null() {
                return true;
            }
            match act.get(k) {
                Some(a) => is_subset(v, a),
                None => false,
            }
        }),
        (Value::Object(exp), _) => exp.is_empty(),
        (Value::Array(exp), Value::Array(act)) => {
            exp.len() == act.len() && exp.iter().zip(act.iter()).all(|(e, a)| is_subset(e, a))
        }
        (e, a) => e == a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> DynamicObject {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn missing_resource_version_always_drifts() {
        let live = obj(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a"}}));
        let dry = obj(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a"}}));
        assert!(has_drifted(&live, &dry));
    }

    #[test]
    fn identical_objects_do_not_drift() {
        let live = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "resourceVersion": "10", "labels": {"app": "web"}},
            "spec": {"replicas": 2}
        }));
        let dry = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "resourceVersion": "10", "labels": {"app": "web"}},
            "spec": {"replicas": 2}
        }));
        assert!(!has_drifted(&live, &dry));
    }

    #[test]
    fn spec_change_drifts() {
        let live = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "resourceVersion": "10"},
            "spec": {"replicas": 2}
        }));
        let dry = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "resourceVersion": "10"},
            "spec": {"replicas": 3}
        }));
        assert!(has_drifted(&live, &dry));
    }

    #[test]
    fn server_defaulted_fields_do_not_drift() {
        // the live object carries fields the merge result does not set
        let live = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "resourceVersion": "10"},
            "spec": {"replicas": 2, "progressDeadlineSeconds": 600}
        }));
        let dry = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "resourceVersion": "10"},
            "spec": {"replicas": 2}
        }));
        assert!(!has_drifted(&live, &dry));
    }

    #[test]
    fn label_change_drifts() {
        let live = obj(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "a", "resourceVersion": "1", "labels": {"tier": "a"}},
            "data": {"k": "v"}
        }));
        let dry = obj(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "a", "resourceVersion": "1", "labels": {"tier": "b"}},
            "data": {"k": "v"}
        }));
        assert!(has_drifted(&live, &dry));
    }

    #[test]
    fn webhook_change_drifts() {
        let live = obj(json!({
            "apiVersion": "admissionregistration.k8s.io/v1", "kind": "ValidatingWebhookConfiguration",
            "metadata": {"name": "gate", "resourceVersion": "7"},
            "webhooks": [{"name": "a.example.com", "failurePolicy": "Fail"}]
        }));
        let dry = obj(json!({
            "apiVersion": "admissionregistration.k8s.io/v1", "kind": "ValidatingWebhookConfiguration",
            "metadata": {"name": "gate", "resourceVersion": "7"},
            "webhooks": [{"name": "a.example.com", "failurePolicy": "Ignore"}]
        }));
        assert!(has_drifted(&live, &dry));
    }

    #[test]
    fn body_comparison_for_specless_kinds() {
        let live = obj(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "a", "resourceVersion": "1"},
            "data": {"k": "v"}
        }));
        let dry = obj(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "a", "resourceVersion": "1"},
            "data": {"k": "v2"}
        }));
        assert!(has_drifted(&live, &dry));
    }

    #[test]
    fn subset_semantics() {
        assert!(is_subset(&json!(null), &json!({"a": 1})));
        assert!(is_subset(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!is_subset(&json!({"a": 1, "c": 3}), &json!({"a": 1})));
        assert!(is_subset(&json!([1, 2]), &json!([1, 2])));
        assert!(!is_subset(&json!([1]), &json!([1, 2])));
        assert!(is_subset(&json!({"a": null}), &json!({})));
    }
}
