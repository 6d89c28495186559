//! Cluster client with a cached view of the discovery data, so that
//! repeated dynamic lookups do not re-run the discovery walk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use kube::{
    api::Api,
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client, Config,
};
use tracing::debug;

use kivo_core::ObjectId;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Explicit kubeconfig path; falls back to `KUBECONFIG` and then to
    /// `~/.kube/config`.
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context override.
    pub context: Option<String>,
}

/// A `kube::Client` plus a process-lifetime discovery cache keyed by
/// group/version/kind.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    cache: Arc<RwLock<HashMap<String, (ApiResource, bool)>>>,
}

impl ClusterClient {
    pub async fn connect(opts: &ConnectOptions) -> Result<Self> {
        let client = match (&opts.kubeconfig, &opts.context) {
            (None, None) => Client::try_default()
                .await
                .map_err(|e| Error::Client(e.to_string()))?,
            (path, context) => {
                let kc_opts = KubeConfigOptions {
                    context: context.clone(),
                    ..KubeConfigOptions::default()
                };
                let config = match path {
                    Some(p) => {
                        let kubeconfig = Kubeconfig::read_from(p)
                            .map_err(|e| Error::Client(e.to_string()))?;
                        Config::from_custom_kubeconfig(kubeconfig, &kc_opts)
                            .await
                            .map_err(|e| Error::Client(e.to_string()))?
                    }
                    None => Config::from_kubeconfig(&kc_opts)
                        .await
                        .map_err(|e| Error::Client(e.to_string()))?,
                };
                Client::try_from(config).map_err(|e| Error::Client(e.to_string()))?
            }
        };

        Ok(Self {
            client,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    /// Resolves the dynamic Api for the given object. Namespaced kinds
    /// without an explicit namespace land in `default`.
    pub async fn api_for(&self, obj: &DynamicObject) -> Result<Api<DynamicObject>> {
        let id = ObjectId::from_object(obj);
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| Error::UnknownKind(id.to_string()))?;
        let gvk = GroupVersionKind {
            group: id.group.clone(),
            version: kivo_core::objid::api_version_of(&types.api_version).to_string(),
            kind: id.kind.clone(),
        };
        self.api_for_gvk(&gvk, obj.metadata.namespace.as_deref())
            .await
    }

    pub async fn api_for_gvk(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>> {
        let (ar, namespaced) = self.resolve(gvk).await?;
        let api = if namespaced {
            Api::namespaced_with(self.client.clone(), namespace.unwrap_or("default"), &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        Ok(api)
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, bool)> {
        let key = gvk_key(gvk);
        if let Some(hit) = self.cache.read().unwrap().get(&key).cloned() {
            return Ok(hit);
        }

        debug!(gvk = %key, "discovery cache miss");
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| Error::Client(format!("discovery failed: {e}")))?;

        let mut found = None;
        {
            let mut cache = self.cache.write().unwrap();
            for group in discovery.groups() {
                for (ar, caps) in group.recommended_resources() {
                    let namespaced = matches!(caps.scope, Scope::Namespaced);
                    let entry_key = gvk_key(&GroupVersionKind {
                        group: ar.group.clone(),
                        version: ar.version.clone(),
                        kind: ar.kind.clone(),
                    });
                    if entry_key == key {
                        found = Some((ar.clone(), namespaced));
                    }
                    cache.insert(entry_key, (ar, namespaced));
                }
            }
        }

        found.ok_or_else(|| Error::UnknownKind(key))
    }
}

fn gvk_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}
