// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::constants::API_GROUP;
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait for the Kluster CRD to be served.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_kluster_crd(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match check_kluster_crd_exists(client).await {
            Ok(true) => {
                info!("Kluster CRD ({}/v1alpha1) is available", API_GROUP);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "Kluster CRD ({}/v1alpha1) not yet available, waiting {} seconds...",
                    API_GROUP, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for Kluster CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

async fn check_kluster_crd_exists(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[API_GROUP])
        .run()
        .await?;

    let found = discovery
        .groups()
        .filter(|g| g.name() == API_GROUP)
        .flat_map(|g| g.recommended_resources())
        .any(|(ar, _)| ar.kind == "Kluster" && ar.version == "v1alpha1");
    Ok(found)
}
