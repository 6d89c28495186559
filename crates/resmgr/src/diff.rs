//! Server-side dry-run diff: what would change if the object were applied.

use kube::api::Patch;
use kube::core::DynamicObject;

use kivo_core::codec::mask_secret;
use kivo_core::ObjectId;

use crate::changeset::{Action, ChangeSetEntry};
use crate::drift::has_drifted;
use crate::error::{Error, Result};
use crate::text::unified_diff;
use crate::ResourceManager;

impl ResourceManager {
    /// Dry-runs the object and reports the drift as a unified diff of the
    /// live vs merged YAML renderings. Secret data is masked; the server's
    /// `managedFields` bookkeeping is stripped for readability.
    ///
    /// Returns the change entry plus the live and merged objects when drift
    /// was detected.
    pub async fn diff(
        &self,
        object: &DynamicObject,
    ) -> Result<(ChangeSetEntry, Option<(DynamicObject, DynamicObject)>)> {
        let id = ObjectId::from_object(object);
        let api = self.client.api_for(object).await?;
        let name = object.metadata.name.clone().unwrap_or_default();

        let live = api.get_opt(&name).await.ok().flatten();

        let mut dry_run = match api
            .patch(&name, &self.diff_params(), &Patch::Apply(object))
            .await
        {
            Ok(obj) => obj,
            Err(e) => return Err(self.validation_error(object, e)),
        };

        if dry_run
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or_default()
            .is_empty()
        {
            return Ok((ChangeSetEntry::new(id.to_string(), Action::Created), None));
        }

        let mut live = live.unwrap_or_else(|| object.clone());
        if !has_drifted(&live, &dry_run) {
            return Ok((ChangeSetEntry::new(id.to_string(), Action::Unchanged), None));
        }

        live.metadata.managed_fields = None;
        dry_run.metadata.managed_fields = None;

        let is_secret = object
            .types
            .as_ref()
            .map(|t| t.kind == "Secret")
            .unwrap_or(false);
        if is_secret {
            // distinct masks keep changed values visible without the data
            dry_run = mask_secret(&dry_run, "******");
            live = mask_secret(&live, "*****");
        }

        let live_yaml =
            serde_yaml::to_string(&live).map_err(|e| Error::Internal(e.to_string()))?;
        let merged_yaml =
            serde_yaml::to_string(&dry_run).map_err(|e| Error::Internal(e.to_string()))?;

        let mut entry = ChangeSetEntry::new(id.to_string(), Action::Configured);
        entry.diff = Some(unified_diff(&live_yaml, &merged_yaml, "live", "merged"));
        Ok((entry, Some((live, dry_run))))
    }

    fn diff_params(&self) -> kube::api::PatchParams {
        kube::api::PatchParams::apply(&self.owner().field)
            .force()
            .dry_run()
    }
}
