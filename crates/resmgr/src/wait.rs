//! Readiness and termination waits. A background poller produces status
//! events into a channel; the waiting task owns the aggregate state and
//! cancels the poller when the target status is reached or the deadline
//! expires.

use std::collections::HashMap;
use std::time::Duration;

use kube::core::DynamicObject;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::debug;

use kivo_core::ObjectId;

use crate::client::ClusterClient;
use crate::error::{Error, Result};
use crate::status::{self, Status, StatusReport};
use crate::ResourceManager;

struct Observed {
    id: ObjectId,
    report: StatusReport,
}

impl ResourceManager {
    /// Blocks until every given object reports Current, or the timeout
    /// elapses. On timeout the error enumerates the objects that were not
    /// yet current together with their last observed status.
    pub async fn wait(
        &self,
        objects: &[DynamicObject],
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }

        let ids: Vec<ObjectId> = objects.iter().map(ObjectId::from_object).collect();
        let (tx, mut rx) = mpsc::channel::<Observed>(objects.len().max(16));
        let producer = tokio::spawn(poll_statuses(
            self.client.clone(),
            objects.to_vec(),
            interval,
            tx,
        ));

        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        let mut last: HashMap<ObjectId, StatusReport> = HashMap::new();
        let result = loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(ev) => {
                        debug!(object = %ev.id, status = %ev.report.status, "status event");
                        last.insert(ev.id, ev.report);
                        let all_current = ids.iter().all(|id| {
                            last.get(id).map(|r| r.status == Status::Current).unwrap_or(false)
                        });
                        if all_current {
                            break Ok(());
                        }
                    }
                    None => break Err(Error::Internal("status poller stopped unexpectedly".into())),
                },
                _ = &mut deadline => {
                    let mut pending = Vec::new();
                    for id in &ids {
                        match last.get(id) {
                            None => pending.push(format!("can't determine status for {id}")),
                            Some(r) if r.status != Status::Current => {
                                pending.push(format!("{id} status: '{}': {}", r.status, r.message));
                            }
                            Some(_) => {}
                        }
                    }
                    break Err(Error::Deadline { pending });
                }
            }
        };

        producer.abort();
        result
    }

    /// Polls until every given object is gone from the cluster. Any error
    /// other than NotFound aborts.
    pub async fn wait_for_termination(
        &self,
        objects: &[DynamicObject],
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;

        for object in objects {
            let id = ObjectId::from_object(object);
            let api = self.client.api_for(object).await?;
            let name = object.metadata.name.clone().unwrap_or_default();

            loop {
                match api.get_opt(&name).await {
                    Ok(None) => break,
                    Ok(Some(_)) => {
                        if Instant::now() >= deadline {
                            return Err(Error::Deadline {
                                pending: vec![format!("{id} still present")],
                            });
                        }
                        sleep(interval).await;
                    }
                    Err(e) => {
                        return Err(Error::Transport {
                            id: id.to_string(),
                            op: "query",
                            source: e,
                        })
                    }
                }
            }
        }
        Ok(())
    }
}

/// Producer half: periodically re-reads every object and emits one status
/// event per object per round. Exits when the receiver is dropped.
async fn poll_statuses(
    client: ClusterClient,
    objects: Vec<DynamicObject>,
    interval: Duration,
    tx: mpsc::Sender<Observed>,
) {
    loop {
        for object in &objects {
            let id = ObjectId::from_object(object);
            let report = read_status(&client, object).await;
            if tx.send(Observed { id, report }).await.is_err() {
                return;
            }
        }
        sleep(interval).await;
    }
}

async fn read_status(client: &ClusterClient, object: &DynamicObject) -> StatusReport {
    let api = match client.api_for(object).await {
        Ok(api) => api,
        Err(e) => {
            return StatusReport {
                status: Status::Unknown,
                message: e.to_string(),
            }
        }
    };
    let name = object.metadata.name.clone().unwrap_or_default();
    match api.get_opt(&name).await {
        Ok(Some(live)) => status::compute(&live),
        Ok(None) => StatusReport {
            status: Status::NotFound,
            message: "object not found".to_string(),
        },
        Err(e) => StatusReport {
            status: Status::Unknown,
            message: e.to_string(),
        },
    }
}
