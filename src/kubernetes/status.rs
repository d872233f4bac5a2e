// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status and finalizer writes for Kluster resources.
//!
//! Every write re-reads the object first and sends its `resourceVersion`
//! along with the merge patch, so the API server rejects the write with a
//! conflict if anything changed in between. Conflicts are retried with a
//! fresh read.

use crate::constants::{FINALIZER, STATUS_UPDATE_ATTEMPTS};
use crate::error::{KlusterError, Result};
use crate::types::kluster::{Kluster, KlusterKey, KlusterStatus, StatusUpdate};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

/// Persists controller-owned state on a Kluster.
#[async_trait::async_trait]
pub trait StatusWriter: Send + Sync {
    /// Read the live status, bypassing any cache
    async fn fetch_status(&self, key: &KlusterKey) -> Result<KlusterStatus>;

    /// Apply `update` to the live status and return the stored result
    async fn update_status(&self, key: &KlusterKey, update: &StatusUpdate) -> Result<KlusterStatus>;

    async fn add_finalizer(&self, key: &KlusterKey) -> Result<()>;

    async fn remove_finalizer(&self, key: &KlusterKey) -> Result<()>;
}

pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &KlusterKey) -> Api<Kluster> {
        Api::namespaced(self.client.clone(), &key.namespace)
    }

    async fn get(&self, key: &KlusterKey) -> Result<Kluster> {
        match self.api(key).get(&key.name).await {
            Ok(k) => Ok(k),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                Err(KlusterError::KlusterNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the finalizer list, guarded by the observed resourceVersion
    async fn patch_finalizers(&self, key: &KlusterKey, current: &Kluster, finalizers: Vec<String>) -> Result<()> {
        let patch = json!({
            "metadata": {
                "resourceVersion": current.resource_version(),
                "finalizers": finalizers,
            }
        });
        self.api(key)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Status body for a merge patch. A cleared message is sent as `null`,
/// otherwise the merge would keep the stored value.
fn status_patch(status: &KlusterStatus) -> Result<Value> {
    let mut body = serde_json::to_value(status)?;
    if status.message.is_none() {
        body["message"] = Value::Null;
    }
    Ok(body)
}

fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(err) if err.code == 409)
}

#[async_trait::async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn fetch_status(&self, key: &KlusterKey) -> Result<KlusterStatus> {
        Ok(self.get(key).await?.current_status())
    }

    #[instrument(skip(self, update), fields(kluster = %key))]
    async fn update_status(&self, key: &KlusterKey, update: &StatusUpdate) -> Result<KlusterStatus> {
        let mut attempt = 1;
        loop {
            // Always start from the latest version, never the cached copy
            let current = self.get(key).await?;
            let stored = current.current_status();
            let mut status = stored.clone();
            status.apply(update)?;
            if status == stored {
                debug!("Status of kluster {} already up to date", key);
                return Ok(status);
            }

            let patch = json!({
                "metadata": { "resourceVersion": current.resource_version() },
                "status": status_patch(&status)?,
            });

            match self
                .api(key)
                .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(updated) => {
                    debug!(
                        "Updated status of kluster {}: progress={}, klusterID={:?}",
                        key,
                        status.progress,
                        status.cluster_id()
                    );
                    return Ok(updated.status.unwrap_or(status));
                }
                Err(e) if is_conflict(&e) && attempt < STATUS_UPDATE_ATTEMPTS => {
                    warn!(
                        "Conflict updating status of kluster {} (attempt {}/{}), retrying",
                        key, attempt, STATUS_UPDATE_ATTEMPTS
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[instrument(skip(self), fields(kluster = %key))]
    async fn add_finalizer(&self, key: &KlusterKey) -> Result<()> {
        let current = self.get(key).await?;
        if current.has_finalizer() {
            return Ok(());
        }

        let mut finalizers = current.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        self.patch_finalizers(key, &current, finalizers).await?;
        info!("Added finalizer to kluster {}", key);
        Ok(())
    }

    #[instrument(skip(self), fields(kluster = %key))]
    async fn remove_finalizer(&self, key: &KlusterKey) -> Result<()> {
        let current = match self.get(key).await {
            Ok(k) => k,
            Err(KlusterError::KlusterNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        if !current.has_finalizer() {
            return Ok(());
        }

        let finalizers: Vec<String> = current
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        self.patch_finalizers(key, &current, finalizers).await?;
        info!("Removed finalizer from kluster {}", key);
        Ok(())
    }
}
