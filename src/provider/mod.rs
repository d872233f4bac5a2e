// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Provider-agnostic interface to the cloud API that hosts managed clusters.

pub mod digitalocean;

pub use digitalocean::DigitalOceanClient;

use crate::error::{KlusterError, Result};
use crate::kubernetes::secrets::ApiToken;
use crate::types::kluster::KlusterSpec;
use thiserror::Error;

/// Errors returned by a provisioning backend
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => !e.is_decode() && !e.is_builder(),
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::NotFound(_) | ProviderError::Decode(_) | ProviderError::InvalidUrl(_) => {
                false
            }
        }
    }
}

/// Request to create a managed cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateClusterRequest {
    pub name: String,
    pub region: String,
    pub version: String,
    pub node_pools: Vec<NodePoolRequest>,
    /// Tags attached to the cluster; always contains the idempotency tag
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePoolRequest {
    pub name: String,
    pub size: String,
    pub count: u32,
}

impl CreateClusterRequest {
    pub fn from_spec(spec: &KlusterSpec, idempotency_tag: &str) -> Result<Self> {
        if spec.node_pools.is_empty() {
            return Err(KlusterError::InvalidSpec(format!(
                "cluster {} needs at least one node pool",
                spec.name
            )));
        }

        Ok(CreateClusterRequest {
            name: spec.name.clone(),
            region: spec.region.clone(),
            version: spec.version.clone(),
            node_pools: spec
                .node_pools
                .iter()
                .map(|p| NodePoolRequest {
                    name: p.name.clone(),
                    size: p.size.clone(),
                    count: p.count,
                })
                .collect(),
            tags: vec![idempotency_tag.to_string()],
        })
    }
}

/// Remote cluster state as seen by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterState {
    Running,
    /// Still converging; carries the raw provider token
    Pending(String),
    /// The provider gave up on this cluster
    Failed(String),
}

/// State token that marks a cluster as ready. Compared case-sensitively.
pub const RUNNING_STATE: &str = "running";

impl ClusterState {
    pub fn from_token(token: &str) -> Self {
        match token {
            RUNNING_STATE => ClusterState::Running,
            "error" | "invalid" | "deleted" => ClusterState::Failed(token.to_string()),
            other => ClusterState::Pending(other.to_string()),
        }
    }
}

/// Capabilities the reconciler needs from a cloud provider.
///
/// Every call carries the token resolved from the Kluster's credential
/// secret, so one client instance serves all resources.
#[async_trait::async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Create a cluster and return its provider-assigned ID
    async fn create_cluster(
        &self,
        token: &ApiToken,
        request: &CreateClusterRequest,
    ) -> std::result::Result<String, ProviderError>;

    async fn cluster_state(
        &self,
        token: &ApiToken,
        cluster_id: &str,
    ) -> std::result::Result<ClusterState, ProviderError>;

    /// Find a cluster previously created with the given idempotency tag
    async fn find_cluster(
        &self,
        token: &ApiToken,
        tag: &str,
    ) -> std::result::Result<Option<String>, ProviderError>;

    async fn delete_cluster(
        &self,
        token: &ApiToken,
        cluster_id: &str,
    ) -> std::result::Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::kluster::NodePool;

    fn spec(node_pools: Vec<NodePool>) -> KlusterSpec {
        KlusterSpec {
            name: "demo".to_string(),
            region: "nyc1".to_string(),
            version: "1.28".to_string(),
            node_pools,
            token_secret: "default/dosecret".to_string(),
        }
    }

    #[test]
    fn test_running_is_case_sensitive() {
        assert_eq!(ClusterState::from_token("running"), ClusterState::Running);
        assert_eq!(
            ClusterState::from_token("Running"),
            ClusterState::Pending("Running".to_string())
        );
    }

    #[test]
    fn test_provider_failures_are_terminal_states() {
        assert_eq!(
            ClusterState::from_token("error"),
            ClusterState::Failed("error".to_string())
        );
        assert_eq!(
            ClusterState::from_token("deleted"),
            ClusterState::Failed("deleted".to_string())
        );
    }

    #[test]
    fn test_other_states_are_pending() {
        for token in ["provisioning", "degraded", "upgrading", ""] {
            assert_eq!(
                ClusterState::from_token(token),
                ClusterState::Pending(token.to_string())
            );
        }
    }

    #[test]
    fn test_request_carries_all_node_pools_and_tag() {
        let request = CreateClusterRequest::from_spec(
            &spec(vec![
                NodePool {
                    name: "pool1".to_string(),
                    size: "s-2vcpu-4gb".to_string(),
                    count: 2,
                },
                NodePool {
                    name: "pool2".to_string(),
                    size: "s-4vcpu-8gb".to_string(),
                    count: 1,
                },
            ]),
            "kluster:uid-1",
        )
        .unwrap();

        assert_eq!(request.name, "demo");
        assert_eq!(request.region, "nyc1");
        assert_eq!(request.version, "1.28");
        assert_eq!(request.node_pools.len(), 2);
        assert_eq!(request.node_pools[1].size, "s-4vcpu-8gb");
        assert_eq!(request.tags, vec!["kluster:uid-1".to_string()]);
    }

    #[test]
    fn test_request_without_node_pools_is_invalid() {
        let err = CreateClusterRequest::from_spec(&spec(vec![]), "kluster:uid-1").unwrap_err();
        assert!(matches!(err, KlusterError::InvalidSpec(_)));
    }

    #[test]
    fn test_retry_classification() {
        let throttled = ProviderError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let bad_request = ProviderError::Api {
            status: 422,
            message: "invalid size".to_string(),
        };
        assert!(throttled.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!ProviderError::NotFound("abc".to_string()).is_retryable());
    }
}
