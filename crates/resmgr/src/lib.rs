//! Kivo resource manager: staged server-side apply with dry-run based
//! drift detection, immutable-field recovery and readiness waits.

#![forbid(unsafe_code)]

mod apply;
mod changeset;
mod client;
mod delete;
mod diff;
mod drift;
mod error;
mod status;
mod text;
mod wait;

pub use apply::fix_replicas_conflict;
pub use changeset::{Action, ChangeSet, ChangeSetEntry};
pub use client::{ClusterClient, ConnectOptions};
pub use error::{Error, Result};
pub use status::{Status, StatusReport};

use kivo_core::{KindOrder, Owner};

/// Reconciles Kubernetes resources onto the target cluster. Stateless
/// between calls; all decisions are made against the cluster's own
/// dry-run merge results.
pub struct ResourceManager {
    client: ClusterClient,
    owner: Owner,
    order: KindOrder,
}

impl ResourceManager {
    pub fn new(client: ClusterClient, owner: Owner, order: KindOrder) -> Self {
        Self { client, owner, order }
    }

    pub fn cluster_client(&self) -> &ClusterClient {
        &self.client
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn kind_order(&self) -> &KindOrder {
        &self.order
    }
}
