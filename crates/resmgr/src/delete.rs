//! Delete path: reverse apply order, idempotent on missing objects.

use kube::api::DeleteParams;
use kube::core::DynamicObject;
use metrics::counter;
use tracing::debug;

use kivo_core::ObjectId;

use crate::changeset::{Action, ChangeSet, ChangeSetEntry};
use crate::error::{is_not_found, Error, Result};
use crate::ResourceManager;

impl ResourceManager {
    /// Deletes the given object. A missing object still yields a `deleted`
    /// entry so that pruning is idempotent.
    pub async fn delete(&self, object: &DynamicObject) -> Result<ChangeSetEntry> {
        let id = ObjectId::from_object(object);
        let api = self.client.api_for(object).await?;
        let name = object.metadata.name.clone().unwrap_or_default();

        match api.get_opt(&name).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                api.delete(&name, &DeleteParams::default())
                    .await
                    .map(|_| ())
                    .or_else(|e| if is_not_found(&e) { Ok(()) } else { Err(e) })
                    .map_err(|e| Error::Transport {
                        id: id.to_string(),
                        op: "delete",
                        source: e,
                    })?;
                counter!("delete_total", 1u64);
                debug!(object = %id, "deleted");
            }
            Err(e) => {
                return Err(Error::Transport {
                    id: id.to_string(),
                    op: "query",
                    source: e,
                })
            }
        }

        Ok(ChangeSetEntry::new(id.to_string(), Action::Deleted))
    }

    /// Deletes the given set in the strict reverse of apply order, so that
    /// controllers can finalize custom resources before their definitions
    /// go away. The first error aborts the batch.
    pub async fn delete_all(&self, objects: &[DynamicObject]) -> Result<ChangeSet> {
        let mut sorted = objects.to_vec();
        self.kind_order().sort_for_delete(&mut sorted);

        let mut changeset = ChangeSet::new();
        for object in &sorted {
            changeset.add(self.delete(object).await?);
        }
        Ok(changeset)
    }
}
