// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kluster reconciler - drives one resource from declaration to a running
//! remote cluster.
//!
//! A pass reads the resource from the local cache, makes sure a remote
//! cluster exists exactly once, then polls the provider until the cluster
//! is running, has failed, or the poll deadline passes. Deleted resources
//! have their remote cluster torn down before the finalizer is released.

use crate::config::Config;
use crate::error::{KlusterError, Result};
use crate::kubernetes::secrets::{ApiToken, SecretRef, TokenResolver};
use crate::kubernetes::status::StatusWriter;
use crate::provider::{ClusterState, CreateClusterRequest, ProviderError, ProvisioningClient};
use crate::types::kluster::{Kluster, KlusterKey, Progress, StatusUpdate};
use kube::runtime::reflector::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How a reconcile pass ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource no longer exists
    Deleted,
    /// Remote cluster torn down and finalizer released
    Finalized,
    Running,
    Failed,
    /// Polling stopped early because the resource is going away or the
    /// controller is shutting down
    Interrupted,
}

enum PollResult {
    Running,
    Failed(String),
    Interrupted,
}

pub struct KlusterReconciler {
    store: Store<Kluster>,
    status: Arc<dyn StatusWriter>,
    credentials: Arc<dyn TokenResolver>,
    provider: Arc<dyn ProvisioningClient>,
    poll_interval: Duration,
    poll_timeout: Duration,
    shutdown: CancellationToken,
}

impl KlusterReconciler {
    pub fn new(
        store: Store<Kluster>,
        status: Arc<dyn StatusWriter>,
        credentials: Arc<dyn TokenResolver>,
        provider: Arc<dyn ProvisioningClient>,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            status,
            credentials,
            provider,
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
            shutdown,
        }
    }

    #[instrument(skip(self), fields(kluster = %key))]
    pub async fn reconcile(&self, key: &KlusterKey) -> Result<ReconcileOutcome> {
        let Some(kluster) = self.store.get(&key.object_ref()) else {
            // The finalizer holds the object until teardown, so nothing is left remotely
            info!("Kluster {} no longer exists", key);
            return Ok(ReconcileOutcome::Deleted);
        };

        if kluster.is_being_deleted() {
            return self.teardown(&kluster).await;
        }

        let status = kluster.current_status();
        match status.progress {
            Progress::Running => {
                debug!("Kluster {} is already running", key);
                return Ok(ReconcileOutcome::Running);
            }
            Progress::Failed => {
                debug!(
                    "Kluster {} previously failed: {}",
                    key,
                    status.message.as_deref().unwrap_or("no message")
                );
                return Ok(ReconcileOutcome::Failed);
            }
            Progress::Unset | Progress::Creating => {}
        }

        self.status.add_finalizer(key).await?;
        let token = self.resolve_token(&kluster).await?;
        let cluster_id = self.ensure_cluster(&kluster, &token).await?;

        match self.wait_until_running(key, &token, &cluster_id).await? {
            PollResult::Running => {
                self.finish(key, StatusUpdate::running()).await?;
                info!("Cluster {} for kluster {} is running", cluster_id, key);
                Ok(ReconcileOutcome::Running)
            }
            PollResult::Failed(state) => {
                let message = format!("cluster {} reported state {:?}", cluster_id, state);
                warn!("Kluster {} failed: {}", key, message);
                self.finish(key, StatusUpdate::failed(message)).await?;
                Ok(ReconcileOutcome::Failed)
            }
            PollResult::Interrupted => Ok(ReconcileOutcome::Interrupted),
        }
    }

    /// Surface a terminal error as the resource's status message
    pub async fn record_error(&self, key: &KlusterKey, error: &KlusterError) {
        match self
            .status
            .update_status(key, &StatusUpdate::error(error.to_string()))
            .await
        {
            Ok(_) | Err(KlusterError::KlusterNotFound(_)) => {}
            Err(e) => warn!("Failed to record error on kluster {}: {}", key, e),
        }
    }

    async fn resolve_token(&self, kluster: &Kluster) -> Result<ApiToken> {
        let reference: SecretRef = kluster.spec.token_secret.parse()?;
        self.credentials.resolve_token(&reference).await
    }

    /// Return the ID of the remote cluster backing `kluster`, creating it if
    /// no earlier pass got that far.
    async fn ensure_cluster(&self, kluster: &Kluster, token: &ApiToken) -> Result<String> {
        let key = kluster.key();
        if let Some(id) = kluster.current_status().cluster_id() {
            debug!("Resuming kluster {} with cluster {}", key, id);
            return Ok(id.to_string());
        }

        // The cache may lag behind our own writes from an earlier pass
        let live = self.status.fetch_status(&key).await?;
        if let Some(id) = live.cluster_id() {
            debug!("Resuming kluster {} with cluster {}", key, id);
            return Ok(id.to_string());
        }

        if let Some(tag) = live.creation_key() {
            if let Some(id) = self.provider.find_cluster(token, tag).await? {
                info!("Adopting cluster {} tagged {} for kluster {}", id, tag, key);
                self.status
                    .update_status(&key, &StatusUpdate::creating(&id))
                    .await?;
                return Ok(id);
            }
        }

        let tag = live
            .creation_key()
            .map(str::to_string)
            .unwrap_or_else(|| kluster.idempotency_key());
        let request = CreateClusterRequest::from_spec(&kluster.spec, &tag)?;

        if live.creation_key().is_none() {
            self.status
                .update_status(&key, &StatusUpdate::creation_started(&tag))
                .await?;
        }

        let id = self.provider.create_cluster(token, &request).await?;
        info!(
            "Created cluster {} ({}) in {} for kluster {}",
            id, request.name, request.region, key
        );
        self.status
            .update_status(&key, &StatusUpdate::creating(&id))
            .await?;
        Ok(id)
    }

    async fn wait_until_running(
        &self,
        key: &KlusterKey,
        token: &ApiToken,
        cluster_id: &str,
    ) -> Result<PollResult> {
        match tokio::time::timeout(self.poll_timeout, self.poll(key, token, cluster_id)).await {
            Ok(result) => result,
            Err(_) => Err(KlusterError::PollTimeout {
                cluster_id: cluster_id.to_string(),
                timeout_secs: self.poll_timeout.as_secs(),
            }),
        }
    }

    async fn poll(&self, key: &KlusterKey, token: &ApiToken, cluster_id: &str) -> Result<PollResult> {
        loop {
            if self.is_gone_or_deleting(key) {
                info!("Kluster {} is going away, stopping poll of {}", key, cluster_id);
                return Ok(PollResult::Interrupted);
            }

            match self.provider.cluster_state(token, cluster_id).await? {
                ClusterState::Running => return Ok(PollResult::Running),
                ClusterState::Failed(state) => return Ok(PollResult::Failed(state)),
                ClusterState::Pending(state) => {
                    debug!("Cluster {} is {}", cluster_id, state);
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Shutdown requested, stopping poll of {}", cluster_id);
                    return Ok(PollResult::Interrupted);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn is_gone_or_deleting(&self, key: &KlusterKey) -> bool {
        self.store
            .get(&key.object_ref())
            .map_or(true, |k| k.is_being_deleted())
    }

    /// Write a terminal status. A resource deleted in the meantime is not an error.
    async fn finish(&self, key: &KlusterKey, update: StatusUpdate) -> Result<()> {
        match self.status.update_status(key, &update).await {
            Ok(_) => Ok(()),
            Err(KlusterError::KlusterNotFound(_)) => {
                debug!("Kluster {} vanished before its status was written", key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn teardown(&self, kluster: &Kluster) -> Result<ReconcileOutcome> {
        let key = kluster.key();
        if !kluster.has_finalizer() {
            debug!("Kluster {} is being deleted and holds no finalizer", key);
            return Ok(ReconcileOutcome::Finalized);
        }

        let status = match self.status.fetch_status(&key).await {
            Ok(status) => status,
            Err(KlusterError::KlusterNotFound(_)) => return Ok(ReconcileOutcome::Deleted),
            Err(e) => return Err(e),
        };

        if status.cluster_id().is_some() || status.creation_key().is_some() {
            let token = self.resolve_token(kluster).await?;
            let cluster_id = match (status.cluster_id(), status.creation_key()) {
                (Some(id), _) => Some(id.to_string()),
                (None, Some(tag)) => self.provider.find_cluster(&token, tag).await?,
                (None, None) => None,
            };

            if let Some(id) = cluster_id {
                match self.provider.delete_cluster(&token, &id).await {
                    Ok(()) => info!("Deleted cluster {} of kluster {}", id, key),
                    Err(ProviderError::NotFound(_)) => {
                        info!("Cluster {} of kluster {} was already gone", id, key)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.status.remove_finalizer(&key).await?;
        Ok(ReconcileOutcome::Finalized)
    }
}
