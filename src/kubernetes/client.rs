// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Management cluster client creation

use crate::error::{KlusterError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as KConfig};
use std::path::Path;
use tracing::{info, warn};

/// Create a client from the kubeconfig at `path`, falling back to the
/// in-cluster service account when the file is absent or unusable.
pub async fn create_client(path: Option<&Path>) -> Result<Client> {
    if let Some(path) = path {
        match config_from_file(path).await {
            Ok(config) => {
                info!("Using kubeconfig {}", path.display());
                return Client::try_from(config).map_err(|e| {
                    KlusterError::KubeconfigError(format!("Failed to create client: {}", e))
                });
            }
            Err(e) => {
                warn!(
                    "Building config from {} failed: {}, trying in-cluster config",
                    path.display(),
                    e
                );
            }
        }
    }

    let config = KConfig::incluster().map_err(|e| {
        KlusterError::KubeconfigError(format!("Failed to load in-cluster config: {}", e))
    })?;
    info!("Using in-cluster config");

    Client::try_from(config)
        .map_err(|e| KlusterError::KubeconfigError(format!("Failed to create client: {}", e)))
}

async fn config_from_file(path: &Path) -> Result<KConfig> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        KlusterError::KubeconfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    config_from_str(&raw).await
}

/// Build a client config from kubeconfig YAML
async fn config_from_str(kubeconfig: &str) -> Result<KConfig> {
    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| KlusterError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;

    KConfig::from_custom_kubeconfig(kubeconfig_parsed, &KubeConfigOptions::default())
        .await
        .map_err(|e| KlusterError::KubeconfigError(format!("Failed to create config: {}", e)))
}
