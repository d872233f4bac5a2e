// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::provider::ProviderError;
use crate::types::kluster::Progress;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KlusterError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Invalid secret reference: {0}")]
    InvalidReference(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Kluster not found: {0}")]
    KlusterNotFound(String),

    #[error("Invalid kluster spec: {0}")]
    InvalidSpec(String),

    #[error("Cluster ID already set to {current}, refusing to reassign to {requested}")]
    ClusterIdReassigned { current: String, requested: String },

    #[error("Refusing to move progress from {from} back to {to}")]
    ProgressRegression { from: Progress, to: Progress },

    #[error("Cluster {cluster_id} was not running after {timeout_secs}s")]
    PollTimeout { cluster_id: String, timeout_secs: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KlusterError {
    /// Whether the work queue should retry the key with backoff.
    ///
    /// Transport failures, throttling, server-side errors, optimistic-lock
    /// conflicts and poll timeouts are retryable. Everything else needs a
    /// change to the resource (or its secret) before another pass can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            KlusterError::KubeError(kube::Error::Api(resp)) => {
                resp.code == 409 || resp.code == 429 || resp.code >= 500
            }
            KlusterError::KubeError(_) => true,
            KlusterError::ProviderError(e) => e.is_retryable(),
            KlusterError::PollTimeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, KlusterError>;
