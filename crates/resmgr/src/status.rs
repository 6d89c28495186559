//! Readiness evaluation for unstructured objects, in the spirit of
//! kstatus: an object is Current once the controllers that own it have
//! fully reconciled the observed state.

use std::fmt;

use kube::core::DynamicObject;
use serde_json::Value;

use kivo_core::paths::{get_nested, get_nested_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Current,
    InProgress,
    Failed,
    Terminating,
    NotFound,
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Current => "Current",
            Status::InProgress => "InProgress",
            Status::Failed => "Failed",
            Status::Terminating => "Terminating",
            Status::NotFound => "NotFound",
            Status::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: Status,
    pub message: String,
}

impl StatusReport {
    fn new(status: Status, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

/// Computes the reconciliation status of a live object.
pub fn compute(obj: &DynamicObject) -> StatusReport {
    if obj.metadata.deletion_timestamp.is_some() {
        return StatusReport::new(Status::Terminating, "object is being deleted");
    }

    // a controller that has not yet seen the latest generation cannot have
    // reconciled it
    if let (Some(generation), Some(observed)) = (
        obj.metadata.generation,
        get_nested(&obj.data, &["status", "observedGeneration"]).and_then(Value::as_i64),
    ) {
        if observed < generation {
            return StatusReport::new(
                Status::InProgress,
                format!("observed generation {observed} lags desired {generation}"),
            );
        }
    }

    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();
    match kind {
        "Deployment" => deployment_status(obj),
        "StatefulSet" => replica_status(obj, "readyReplicas"),
        "ReplicaSet" | "ReplicationController" => replica_status(obj, "readyReplicas"),
        "DaemonSet" => daemonset_status(obj),
        "Pod" => pod_status(obj),
        "Job" => job_status(obj),
        "PersistentVolumeClaim" => phase_status(obj, "Bound"),
        "CustomResourceDefinition" => condition_status(obj, "Established"),
        "Namespace" => namespace_status(obj),
        "Service" => service_status(obj),
        _ => generic_status(obj),
    }
}

fn int(obj: &DynamicObject, path: &[&str]) -> Option<i64> {
    get_nested(&obj.data, path).and_then(Value::as_i64)
}

fn condition<'a>(obj: &'a DynamicObject, cond_type: &str) -> Option<&'a Value> {
    get_nested(&obj.data, &["status", "conditions"])
        .and_then(Value::as_array)?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(cond_type))
}

fn condition_status(obj: &DynamicObject, cond_type: &str) -> StatusReport {
    if condition_true(obj, cond_type) {
        StatusReport::new(Status::Current, format!("{cond_type} is True"))
    } else {
        StatusReport::new(Status::InProgress, format!("waiting for {cond_type}"))
    }
}

fn condition_true(obj: &DynamicObject, cond_type: &str) -> bool {
    condition(obj, cond_type)
        .and_then(|c| c.get("status"))
        .and_then(Value::as_str)
        == Some("True")
}

fn deployment_status(obj: &DynamicObject) -> StatusReport {
    if let Some(progressing) = condition(obj, "Progressing") {
        if progressing.get("reason").and_then(Value::as_str) == Some("ProgressDeadlineExceeded") {
            return StatusReport::new(Status::Failed, "progress deadline exceeded");
        }
    }

    let want = int(obj, &["spec", "replicas"]).unwrap_or(1);
    let updated = int(obj, &["status", "updatedReplicas"]).unwrap_or(0);
    let available = int(obj, &["status", "availableReplicas"]).unwrap_or(0);
    if updated >= want && available >= want {
        StatusReport::new(Status::Current, "deployment is available")
    } else {
        StatusReport::new(
            Status::InProgress,
            format!("{available} of {want} replicas available"),
        )
    }
}

fn replica_status(obj: &DynamicObject, ready_field: &str) -> StatusReport {
    let want = int(obj, &["spec", "replicas"]).unwrap_or(1);
    let ready = int(obj, &["status", ready_field]).unwrap_or(0);
    if ready >= want {
        StatusReport::new(Status::Current, "all replicas are ready")
    } else {
        StatusReport::new(Status::InProgress, format!("{ready} of {want} replicas ready"))
    }
}

fn daemonset_status(obj: &DynamicObject) -> StatusReport {
    let desired = int(obj, &["status", "desiredNumberScheduled"]).unwrap_or(0);
    let available = int(obj, &["status", "numberAvailable"]).unwrap_or(0);
    if available >= desired {
        StatusReport::new(Status::Current, "all pods are available")
    } else {
        StatusReport::new(
            Status::InProgress,
            format!("{available} of {desired} pods available"),
        )
    }
}

fn pod_status(obj: &DynamicObject) -> StatusReport {
    match get_nested_str(&obj.data, &["status", "phase"]).unwrap_or("") {
        "Succeeded" => StatusReport::new(Status::Current, "pod succeeded"),
        "Failed" => StatusReport::new(Status::Failed, "pod failed"),
        "Running" if condition_true(obj, "Ready") => {
            StatusReport::new(Status::Current, "pod is ready")
        }
        phase => StatusReport::new(Status::InProgress, format!("pod phase '{phase}'")),
    }
}

fn job_status(obj: &DynamicObject) -> StatusReport {
    if condition_true(obj, "Complete") {
        return StatusReport::new(Status::Current, "job completed");
    }
    if condition_true(obj, "Failed") {
        let msg = condition(obj, "Failed")
            .and_then(|c| c.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("job failed");
        return StatusReport::new(Status::Failed, msg.to_string());
    }
    StatusReport::new(Status::InProgress, "job in progress")
}

fn phase_status(obj: &DynamicObject, want: &str) -> StatusReport {
    let phase = get_nested_str(&obj.data, &["status", "phase"]).unwrap_or("");
    if phase == want {
        StatusReport::new(Status::Current, format!("phase '{phase}'"))
    } else {
        StatusReport::new(Status::InProgress, format!("phase '{phase}', want '{want}'"))
    }
}

fn namespace_status(obj: &DynamicObject) -> StatusReport {
    match get_nested_str(&obj.data, &["status", "phase"]) {
        Some("Terminating") => StatusReport::new(Status::Terminating, "namespace is terminating"),
        _ => StatusReport::new(Status::Current, "namespace is active"),
    }
}

fn service_status(obj: &DynamicObject) -> StatusReport {
    if get_nested_str(&obj.data, &["spec", "type"]) == Some("LoadBalancer") {
        let assigned = get_nested(&obj.data, &["status", "loadBalancer", "ingress"])
            .and_then(Value::as_array)
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if !assigned {
            return StatusReport::new(Status::InProgress, "waiting for load balancer ingress");
        }
    }
    StatusReport::new(Status::Current, "service is ready")
}

/// Kinds without bespoke rules: a `Ready` or `Available` condition decides;
/// objects with no status at all are Current the moment they exist.
fn generic_status(obj: &DynamicObject) -> StatusReport {
    for cond_type in ["Ready", "Available"] {
        if let Some(c) = condition(obj, cond_type) {
            return match c.get("status").and_then(Value::as_str) {
                Some("True") => StatusReport::new(Status::Current, format!("{cond_type} is True")),
                _ => {
                    let msg = c
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("condition not met");
                    StatusReport::new(Status::InProgress, msg.to_string())
                }
            };
        }
    }
    StatusReport::new(Status::Current, "object exists")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> DynamicObject {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn deployment_available() {
        let d = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"replicas": 2},
            "status": {"updatedReplicas": 2, "availableReplicas": 2}
        }));
        assert_eq!(compute(&d).status, Status::Current);
    }

    #[test]
    fn deployment_rolling() {
        let d = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"replicas": 3},
            "status": {"updatedReplicas": 1, "availableReplicas": 1}
        }));
        let report = compute(&d);
        assert_eq!(report.status, Status::InProgress);
        assert!(report.message.contains("1 of 3"));
    }

    #[test]
    fn deployment_progress_deadline() {
        let d = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {"replicas": 1},
            "status": {"conditions": [
                {"type": "Progressing", "status": "False", "reason": "ProgressDeadlineExceeded"}
            ]}
        }));
        assert_eq!(compute(&d).status, Status::Failed);
    }

    #[test]
    fn observed_generation_lag() {
        let d = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "generation": 4},
            "spec": {"replicas": 1},
            "status": {"observedGeneration": 3, "updatedReplicas": 1, "availableReplicas": 1}
        }));
        assert_eq!(compute(&d).status, Status::InProgress);
    }

    #[test]
    fn deletion_timestamp_means_terminating() {
        let d = obj(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "a", "deletionTimestamp": "2024-05-01T10:00:00Z"}
        }));
        assert_eq!(compute(&d).status, Status::Terminating);
    }

    #[test]
    fn job_outcomes() {
        let done = obj(json!({
            "apiVersion": "batch/v1", "kind": "Job",
            "metadata": {"name": "migrate"},
            "status": {"conditions": [{"type": "Complete", "status": "True"}]}
        }));
        assert_eq!(compute(&done).status, Status::Current);

        let failed = obj(json!({
            "apiVersion": "batch/v1", "kind": "Job",
            "metadata": {"name": "migrate"},
            "status": {"conditions": [{"type": "Failed", "status": "True", "message": "backoff limit"}]}
        }));
        let report = compute(&failed);
        assert_eq!(report.status, Status::Failed);
        assert_eq!(report.message, "backoff limit");
    }

    #[test]
    fn crd_established() {
        let crd = obj(json!({
            "apiVersion": "apiextensions.k8s.io/v1", "kind": "CustomResourceDefinition",
            "metadata": {"name": "widgets.example.com"},
            "status": {"conditions": [{"type": "Established", "status": "True"}]}
        }));
        assert_eq!(compute(&crd).status, Status::Current);
    }

    #[test]
    fn statusless_objects_are_current() {
        let cm = obj(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "a"},
            "data": {"k": "v"}
        }));
        assert_eq!(compute(&cm).status, Status::Current);
    }

    #[test]
    fn generic_ready_condition() {
        let widget = obj(json!({
            "apiVersion": "example.com/v1", "kind": "Widget",
            "metadata": {"name": "w"},
            "status": {"conditions": [{"type": "Ready", "status": "False", "message": "booting"}]}
        }));
        let report = compute(&widget);
        assert_eq!(report.status, Status::InProgress);
        assert_eq!(report.message, "booting");
    }

    #[test]
    fn load_balancer_service() {
        let pending = obj(json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "lb"},
            "spec": {"type": "LoadBalancer"},
            "status": {"loadBalancer": {}}
        }));
        assert_eq!(compute(&pending).status, Status::InProgress);

        let ready = obj(json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "lb"},
            "spec": {"type": "LoadBalancer"},
            "status": {"loadBalancer": {"ingress": [{"ip": "10.0.0.1"}]}}
        }));
        assert_eq!(compute(&ready).status, Status::Current);
    }
}
