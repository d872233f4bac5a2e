// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{FINALIZER, IDEMPOTENCY_TAG_PREFIX};
use crate::error::{KlusterError, Result};
use kube::runtime::reflector::ObjectRef;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(group = "vedratan.dev", version = "v1alpha1", kind = "Kluster")]
#[kube(namespaced)]
#[kube(status = "KlusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct KlusterSpec {
    /// Name of the managed cluster at the cloud provider
    pub name: String,
    pub region: String,
    /// Kubernetes version slug, e.g. "1.28"
    pub version: String,
    pub node_pools: Vec<NodePool>,
    /// Credential secret in "namespace/name" form
    pub token_secret: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct NodePool {
    pub name: String,
    /// Machine size slug, e.g. "s-2vcpu-4gb"
    pub size: String,
    pub count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KlusterStatus {
    /// Identifier of the remote cluster, empty until creation succeeds
    #[serde(rename = "klusterID", default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub progress: Progress,
    /// Idempotency tag written before the remote create call is issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Coarse provisioning phase mirrored from the remote cluster.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum Progress {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "creating")]
    Creating,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "failed")]
    Failed,
}

impl Progress {
    fn rank(self) -> u8 {
        match self {
            Progress::Unset => 0,
            Progress::Creating => 1,
            Progress::Running | Progress::Failed => 2,
        }
    }

    /// Progress only moves forward; re-applying the current value is allowed.
    pub fn can_advance_to(self, next: Progress) -> bool {
        self == next || next.rank() > self.rank()
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Progress::Unset => "\"\"",
            Progress::Creating => "creating",
            Progress::Running => "running",
            Progress::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A partial status write. Unset fields leave the stored value alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusUpdate {
    pub cluster_id: Option<String>,
    pub progress: Option<Progress>,
    pub creation_key: Option<String>,
    pub message: Option<String>,
}

impl StatusUpdate {
    pub fn creation_started(creation_key: impl Into<String>) -> Self {
        StatusUpdate {
            creation_key: Some(creation_key.into()),
            ..Default::default()
        }
    }

    pub fn creating(cluster_id: impl Into<String>) -> Self {
        StatusUpdate {
            cluster_id: Some(cluster_id.into()),
            progress: Some(Progress::Creating),
            ..Default::default()
        }
    }

    pub fn running() -> Self {
        StatusUpdate {
            progress: Some(Progress::Running),
            message: Some(String::new()),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        StatusUpdate {
            progress: Some(Progress::Failed),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Record the last terminal error without touching progress
    pub fn error(message: impl Into<String>) -> Self {
        StatusUpdate {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

impl KlusterStatus {
    /// The remote cluster ID, treating an empty string as unset.
    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn creation_key(&self) -> Option<&str> {
        self.creation_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Merge an update into this status, enforcing that the cluster ID and
    /// creation key are written once and that progress never regresses.
    pub fn apply(&mut self, update: &StatusUpdate) -> Result<()> {
        if let Some(requested) = update.cluster_id.as_deref().filter(|id| !id.is_empty()) {
            match self.cluster_id() {
                Some(current) if current != requested => {
                    return Err(KlusterError::ClusterIdReassigned {
                        current: current.to_string(),
                        requested: requested.to_string(),
                    });
                }
                Some(_) => {}
                None => self.cluster_id = Some(requested.to_string()),
            }
        }

        if let Some(next) = update.progress {
            if !self.progress.can_advance_to(next) {
                return Err(KlusterError::ProgressRegression {
                    from: self.progress,
                    to: next,
                });
            }
            self.progress = next;
        }

        if let Some(key) = update.creation_key.as_deref().filter(|k| !k.is_empty()) {
            if self.creation_key().is_none() {
                self.creation_key = Some(key.to_string());
            }
        }

        if let Some(message) = &update.message {
            self.message = Some(message.clone()).filter(|m| !m.is_empty());
        }

        Ok(())
    }
}

impl Kluster {
    pub fn key(&self) -> KlusterKey {
        KlusterKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    pub fn current_status(&self) -> KlusterStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// Tag identifying the remote cluster created for this resource.
    ///
    /// Derived from the object UID so a recreated Kluster with the same name
    /// never adopts the previous incarnation's cluster.
    pub fn idempotency_key(&self) -> String {
        let identity = match self.uid() {
            Some(uid) => uid,
            None => format!(
                "{}-{}",
                self.namespace().unwrap_or_default(),
                self.name_any()
            ),
        };
        let sanitized: String = identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!("{}:{}", IDEMPOTENCY_TAG_PREFIX, sanitized)
    }
}

/// Work queue key: the namespace-qualified name of a Kluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KlusterKey {
    pub namespace: String,
    pub name: String,
}

impl KlusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        KlusterKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn object_ref(&self) -> ObjectRef<Kluster> {
        ObjectRef::new(&self.name).within(&self.namespace)
    }
}

impl fmt::Display for KlusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
