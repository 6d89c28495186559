//! Apply path: server-side dry-run, drift detection, staged rollout and
//! immutable-field recovery.

use std::time::{Duration, Instant};

use kube::api::{DeleteParams, Patch, PatchParams};
use kube::core::DynamicObject;
use metrics::{counter, histogram};
use tracing::debug;

use kivo_core::paths::{get_nested_str, remove_nested};
use kivo_core::sort::is_cluster_definition;
use kivo_core::ObjectId;

use crate::changeset::{Action, ChangeSet, ChangeSetEntry};
use crate::drift::has_drifted;
use crate::error::{is_conflict, is_immutable_error, is_not_found, Error, Result};
use crate::ResourceManager;

impl ResourceManager {
    /// Performs a server-side apply of the given object if the matching
    /// in-cluster object is different or if it doesn't exist. Drift
    /// detection is performed by comparing the server-side dry-run result
    /// with the live object. When immutable field changes are detected,
    /// the object is recreated if `force` is set.
    pub async fn apply(&self, object: &DynamicObject, force: bool) -> Result<ChangeSetEntry> {
        let start = Instant::now();
        counter!("apply_total", 1u64);
        let id = ObjectId::from_object(object);
        let api = self.client.api_for(object).await?;
        let name = object.metadata.name.clone().unwrap_or_default();

        for attempt in 0..2 {
            // best-effort: a transient error here surfaces in the dry-run
            let live = api.get_opt(&name).await.ok().flatten();

            let dry_run = match api
                .patch(&name, &self.dry_run_params(), &Patch::Apply(object))
                .await
            {
                Ok(obj) => obj,
                Err(e) if force && attempt == 0 && is_immutable_error(&e) => {
                    self.delete_for_recreate(&api, &name, &id).await?;
                    continue;
                }
                Err(e) => {
                    counter!("apply_errors_total", 1u64);
                    return Err(self.validation_error(object, e));
                }
            };

            // do not apply objects that have not drifted to avoid bumping
            // the resource version
            if !has_drifted(live.as_ref().unwrap_or(object), &dry_run) {
                return Ok(ChangeSetEntry::new(id.to_string(), Action::Unchanged));
            }

            if let Err(e) = api
                .patch(&name, &self.apply_params(), &Patch::Apply(object))
                .await
            {
                counter!("apply_errors_total", 1u64);
                return Err(self.apply_transport_error(&id, e));
            }

            histogram!("apply_latency_ms", start.elapsed().as_secs_f64() * 1000.0);
            let action = if is_new(&dry_run) { Action::Created } else { Action::Configured };
            return Ok(ChangeSetEntry::new(id.to_string(), action));
        }

        Err(Error::Immutable {
            id: id.to_string(),
            reason: "object recreation did not converge".to_string(),
        })
    }

    /// Performs a server-side dry-run of the whole set in apply order, then
    /// applies the objects that are new or modified, also in apply order.
    pub async fn apply_all(&self, objects: &[DynamicObject], force: bool) -> Result<ChangeSet> {
        let mut sorted = objects.to_vec();
        self.kind_order().sort_for_apply(&mut sorted);

        let mut recovered = false;
        'pass: loop {
            let mut changeset = ChangeSet::new();
            let mut to_apply = Vec::new();

            for object in &sorted {
                let id = ObjectId::from_object(object);
                let api = self.client.api_for(object).await?;
                let name = object.metadata.name.clone().unwrap_or_default();
                let live = api.get_opt(&name).await.ok().flatten();

                let dry_run = match api
                    .patch(&name, &self.dry_run_params(), &Patch::Apply(object))
                    .await
                {
                    Ok(obj) => obj,
                    Err(e) if force && !recovered && is_immutable_error(&e) => {
                        self.delete_for_recreate(&api, &name, &id).await?;
                        recovered = true;
                        continue 'pass;
                    }
                    Err(e) => return Err(self.validation_error(object, e)),
                };

                if has_drifted(live.as_ref().unwrap_or(object), &dry_run) {
                    let action = if is_new(&dry_run) { Action::Created } else { Action::Configured };
                    changeset.add(ChangeSetEntry::new(id.to_string(), action));
                    to_apply.push(object.clone());
                } else {
                    changeset.add(ChangeSetEntry::new(id.to_string(), Action::Unchanged));
                }
            }

            for object in &to_apply {
                let id = ObjectId::from_object(object);
                let api = self.client.api_for(object).await?;
                let name = object.metadata.name.clone().unwrap_or_default();
                if let Err(e) = api
                    .patch(&name, &self.apply_params(), &Patch::Apply(object))
                    .await
                {
                    counter!("apply_errors_total", 1u64);
                    return Err(self.apply_transport_error(&id, e));
                }
                debug!(object = %id, "applied");
            }

            return Ok(changeset);
        }
    }

    /// Applies CRDs and Namespaces first and waits for them to register,
    /// then applies everything else. Required whenever the set mixes
    /// definitions with the custom resources or namespaced objects that
    /// depend on them.
    pub async fn apply_all_staged(
        &self,
        objects: &[DynamicObject],
        force: bool,
        wait_budget: Duration,
    ) -> Result<ChangeSet> {
        let mut changeset = ChangeSet::new();

        let (stage_one, stage_two): (Vec<_>, Vec<_>) = objects.iter().cloned().partition(|o| {
            o.types
                .as_ref()
                .map(|t| is_cluster_definition(&t.kind))
                .unwrap_or(false)
        });

        if !stage_one.is_empty() {
            changeset.append(self.apply_all(&stage_one, force).await?);
            self.wait(&stage_one, Duration::from_secs(2), wait_budget).await?;
        }

        changeset.append(self.apply_all(&stage_two, force).await?);
        Ok(changeset)
    }

    /// Writes the inventory ownership labels on the desired set before
    /// apply, so that cluster objects can be traced back to the inventory
    /// that owns them.
    pub fn set_owner_labels(&self, objects: &mut [DynamicObject], name: &str, namespace: &str) {
        let group = &self.owner().group;
        for object in objects {
            let labels = object.metadata.labels.get_or_insert_with(Default::default);
            labels.insert(format!("{group}/name"), name.to_string());
            labels.insert(format!("{group}/namespace"), namespace.to_string());
        }
    }

    async fn delete_for_recreate(
        &self,
        api: &kube::Api<DynamicObject>,
        name: &str,
        id: &ObjectId,
    ) -> Result<()> {
        debug!(object = %id, "immutable field change, recreating");
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::Immutable {
                id: id.to_string(),
                reason: format!("failed to delete object, error: {e}"),
            })
    }

    fn dry_run_params(&self) -> PatchParams {
        PatchParams::apply(&self.owner().field).force().dry_run()
    }

    fn apply_params(&self) -> PatchParams {
        PatchParams::apply(&self.owner().field).force()
    }

    fn apply_transport_error(&self, id: &ObjectId, err: kube::Error) -> Error {
        if is_conflict(&err) {
            return Error::Conflict {
                id: id.to_string(),
                reason: err.to_string(),
            };
        }
        Error::Transport {
            id: id.to_string(),
            op: "apply",
            source: err,
        }
    }

    /// Formats a dry-run failure, hiding sensitive data when the error was
    /// caused by an invalid Kubernetes Secret.
    pub(crate) fn validation_error(&self, object: &DynamicObject, err: kube::Error) -> Error {
        let id = ObjectId::from_object(object).to_string();

        if is_not_found(&err) {
            return Error::Validation {
                id,
                reason: format!("namespace not specified, error: {err}"),
            };
        }

        let kind = object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default();
        if kind == "Secret" {
            let reason = if err.to_string().contains("immutable") {
                "secret is immutable"
            } else {
                "data values must be of type string"
            };
            return Error::Validation { id, reason: reason.to_string() };
        }

        if is_immutable_error(&err) {
            return Error::Immutable { id, reason: api_message(&err) };
        }
        if is_conflict(&err) {
            return Error::Conflict { id, reason: api_message(&err) };
        }
        match err {
            kube::Error::Api(ae) => Error::Validation { id, reason: ae.message },
            other => Error::Transport { id, op: "dry-run apply", source: other },
        }
    }
}

fn is_new(dry_run: &DynamicObject) -> bool {
    dry_run
        .metadata
        .resource_version
        .as_deref()
        .unwrap_or_default()
        .is_empty()
}

fn api_message(err: &kube::Error) -> String {
    match err {
        kube::Error::Api(ae) => ae.message.clone(),
        other => other.to_string(),
    }
}

/// Removes `spec.replicas` from every workload that is scale-managed by a
/// HorizontalPodAutoscaler in the same set and namespace. Without this the
/// field would oscillate between this field manager and the HPA controller.
pub fn fix_replicas_conflict(objects: &mut [DynamicObject]) {
    let targets: Vec<(String, String, String)> = objects
        .iter()
        .filter(|o| {
            o.types
                .as_ref()
                .map(|t| t.kind == "HorizontalPodAutoscaler")
                .unwrap_or(false)
        })
        .filter_map(|hpa| {
            let kind = get_nested_str(&hpa.data, &["spec", "scaleTargetRef", "kind"])?;
            let name = get_nested_str(&hpa.data, &["spec", "scaleTargetRef", "name"])?;
            Some((
                hpa.metadata.namespace.clone().unwrap_or_default(),
                kind.to_string(),
                name.to_string(),
            ))
        })
        .collect();

    for object in objects.iter_mut() {
        let kind = match &object.types {
            Some(t) => t.kind.clone(),
            None => continue,
        };
        let name = object.metadata.name.clone().unwrap_or_default();
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        if targets
            .iter()
            .any(|(ns, tk, tn)| *ns == namespace && *tk == kind && *tn == name)
        {
            remove_nested(&mut object.data, &["spec", "replicas"]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kivo_core::codec::read_objects;

    #[test]
    fn hpa_scrub_removes_replicas_from_its_target_only() {
        let mut objects = read_objects(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: demo
spec:
  replicas: 2
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: worker
  namespace: demo
spec:
  replicas: 4
---
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: web
  namespace: demo
spec:
  scaleTargetRef:
    apiVersion: apps/v1
    kind: Deployment
    name: web
  minReplicas: 2
  maxReplicas: 10
"#,
        )
        .unwrap();

        fix_replicas_conflict(&mut objects);

        assert!(objects[0].data["spec"].get("replicas").is_none());
        assert_eq!(objects[1].data["spec"]["replicas"], 4);
    }

    #[test]
    fn hpa_scrub_respects_namespaces() {
        let mut objects = read_objects(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: other
spec:
  replicas: 2
---
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: web
  namespace: demo
spec:
  scaleTargetRef:
    kind: Deployment
    name: web
"#,
        )
        .unwrap();

        fix_replicas_conflict(&mut objects);
        assert_eq!(objects[0].data["spec"]["replicas"], 2);
    }
}
