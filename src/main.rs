// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use kluster::config::Config;
use kluster::controller::KlusterController;
use kluster::kubernetes::{create_client, wait_for_kluster_crd, KubeSecretResolver, KubeStatusWriter};
use kluster::provider::DigitalOceanClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting Kluster controller");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: workers={}, poll_interval={:?}, poll_timeout={:?}",
        config.workers, config.poll_interval, config.poll_timeout
    );

    // Create Kubernetes client
    let client = create_client(config.kubeconfig.as_deref()).await?;
    info!("Connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    // Wait for the Kluster CRD before starting the controller
    info!("Waiting for Kluster CRD to become available...");
    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("Shutdown requested while waiting for the CRD");
            return Ok(());
        }
        res = wait_for_kluster_crd(&client) => res?,
    }

    let provider = DigitalOceanClient::new(&config.digitalocean_api_url)?;
    let status = KubeStatusWriter::new(client.clone());
    let credentials = KubeSecretResolver::new(client.clone(), &config.token_secret_key);

    let controller = KlusterController::new(
        client,
        &config,
        Arc::new(status),
        Arc::new(credentials),
        Arc::new(provider),
        shutdown,
    );

    info!("Starting controller...");
    controller.run().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {
            info!("Captured ctrl_c signal");
        },
        _ = terminate => {
            info!("Captured SIGTERM");
        },
    }
}
