// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DigitalOcean Kubernetes (DOKS) provisioning client.
//!
//! Talks to the v2 REST API:
//! - `POST   /v2/kubernetes/clusters`
//! - `GET    /v2/kubernetes/clusters/{id}`
//! - `GET    /v2/kubernetes/clusters` (paginated)
//! - `DELETE /v2/kubernetes/clusters/{id}`

use super::{ClusterState, CreateClusterRequest, ProviderError, ProvisioningClient};
use crate::kubernetes::secrets::ApiToken;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

const CLUSTERS_PATH: &str = "/v2/kubernetes/clusters";
const PAGE_SIZE: u32 = 200;

pub struct DigitalOceanClient {
    client: Client,
    base_url: String,
    base: Url,
}

#[derive(Serialize)]
struct CreateClusterBody<'a> {
    name: &'a str,
    region: &'a str,
    version: &'a str,
    node_pools: Vec<NodePoolBody<'a>>,
    tags: &'a [String],
}

#[derive(Serialize)]
struct NodePoolBody<'a> {
    size: &'a str,
    name: &'a str,
    count: u32,
}

#[derive(Deserialize)]
struct ClusterEnvelope {
    kubernetes_cluster: DoCluster,
}

#[derive(Deserialize)]
struct ClusterList {
    #[serde(default)]
    kubernetes_clusters: Vec<DoCluster>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Deserialize)]
struct DoCluster {
    id: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    status: Option<DoClusterStatus>,
}

#[derive(Deserialize)]
struct DoClusterStatus {
    #[serde(default)]
    state: String,
}

#[derive(Deserialize, Default)]
struct Links {
    #[serde(default)]
    pages: Option<Pages>,
}

#[derive(Deserialize, Default)]
struct Pages {
    next: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

impl DigitalOceanClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.digitalocean.com")
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                base_url,
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            base: parsed,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn clusters_url(&self) -> String {
        format!("{}{}", self.base_url, CLUSTERS_PATH)
    }

    fn cluster_url(&self, id: &str) -> String {
        format!("{}{}/{}", self.base_url, CLUSTERS_PATH, id)
    }

    /// Resolve a `links.pages.next` value against the API base. Links to
    /// another origin are refused so the token never leaves the API host.
    fn next_page_url(&self, next: &str) -> Result<String, ProviderError> {
        let url = self
            .base
            .join(next)
            .map_err(|e| ProviderError::InvalidUrl(format!("next page {}: {}", next, e)))?;
        if url.origin() != self.base.origin() {
            return Err(ProviderError::InvalidUrl(format!(
                "next page {} is outside {}",
                next, self.base_url
            )));
        }
        Ok(url.into())
    }

    async fn get_cluster(&self, token: &ApiToken, id: &str) -> Result<DoCluster, ProviderError> {
        let response = self
            .client
            .get(self.cluster_url(id))
            .bearer_auth(token.expose())
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(format!("cluster {}", id)));
        }

        let envelope: ClusterEnvelope = decode(check_status(response).await?).await?;
        Ok(envelope.kubernetes_cluster)
    }
}

/// Turn a non-success response into `ProviderError::Api`
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) if !err.message.is_empty() => format!("{} ({})", err.message, err.id),
        _ => body.chars().take(500).collect(),
    };

    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ProviderError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        ProviderError::Decode(format!(
            "{} - Response (first 500 chars): {}",
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}

#[async_trait::async_trait]
impl ProvisioningClient for DigitalOceanClient {
    #[instrument(skip(self, token, request), fields(cluster = %request.name, region = %request.region))]
    async fn create_cluster(
        &self,
        token: &ApiToken,
        request: &CreateClusterRequest,
    ) -> Result<String, ProviderError> {
        let body = CreateClusterBody {
            name: &request.name,
            region: &request.region,
            version: &request.version,
            node_pools: request
                .node_pools
                .iter()
                .map(|p| NodePoolBody {
                    size: &p.size,
                    name: &p.name,
                    count: p.count,
                })
                .collect(),
            tags: &request.tags,
        };

        let response = self
            .client
            .post(self.clusters_url())
            .bearer_auth(token.expose())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let envelope: ClusterEnvelope = decode(check_status(response).await?).await?;
        info!(
            "DigitalOcean accepted cluster {} with ID {}",
            request.name, envelope.kubernetes_cluster.id
        );
        Ok(envelope.kubernetes_cluster.id)
    }

    #[instrument(skip(self, token))]
    async fn cluster_state(
        &self,
        token: &ApiToken,
        cluster_id: &str,
    ) -> Result<ClusterState, ProviderError> {
        let cluster = self.get_cluster(token, cluster_id).await?;
        let state = cluster.status.map(|s| s.state).unwrap_or_default();
        debug!("Cluster {} reports state {:?}", cluster_id, state);
        Ok(ClusterState::from_token(&state))
    }

    #[instrument(skip(self, token))]
    async fn find_cluster(&self, token: &ApiToken, tag: &str) -> Result<Option<String>, ProviderError> {
        let mut url = format!("{}?per_page={}", self.clusters_url(), PAGE_SIZE);

        loop {
            debug!("Fetching page: {}", url);
            let response = self
                .client
                .get(&url)
                .bearer_auth(token.expose())
                .header("Accept", "application/json")
                .send()
                .await?;

            let page: ClusterList = decode(check_status(response).await?).await?;
            if let Some(cluster) = page
                .kubernetes_clusters
                .into_iter()
                .find(|c| c.tags.iter().any(|t| t == tag))
            {
                return Ok(Some(cluster.id));
            }

            match page.links.and_then(|l| l.pages).and_then(|p| p.next) {
                Some(next) => url = self.next_page_url(&next)?,
                None => return Ok(None),
            }
        }
    }

    #[instrument(skip(self, token))]
    async fn delete_cluster(&self, token: &ApiToken, cluster_id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.cluster_url(cluster_id))
            .bearer_auth(token.expose())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(format!("cluster {}", cluster_id)));
        }

        check_status(response).await?;
        info!("Deleted DigitalOcean cluster {}", cluster_id);
        Ok(())
    }
}
