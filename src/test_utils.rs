// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock Kubernetes API and in-memory fakes of the
//! reconciler's collaborators.

use crate::error::{KlusterError, Result};
use crate::kubernetes::secrets::{ApiToken, SecretRef, TokenResolver};
use crate::kubernetes::status::StatusWriter;
use crate::provider::{ClusterState, CreateClusterRequest, ProviderError, ProvisioningClient};
use crate::types::kluster::{Kluster, KlusterKey, KlusterSpec, KlusterStatus, NodePool, StatusUpdate};
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher;
use kube::Client;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

type Responses = HashMap<(String, String), VecDeque<(u16, String)>>;

/// A request seen by the mock API server
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// A mock HTTP service that returns predefined responses based on request paths.
///
/// Several responses registered for the same method and path are served in
/// order; the last one repeats.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<Responses>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back((status, body.to_string()));
        self
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for PATCH requests matching the exact path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    /// Shared handle to every request served so far
    pub fn requests(&self) -> Arc<Mutex<Vec<RecordedRequest>>> {
        self.requests.clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let mut responses = self.responses.lock().unwrap();
        let queue = responses.get_mut(&(method.to_string(), path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let response = self.find_response(&method, &path);
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = req.into_body().collect().await?.to_bytes();
            requests.lock().unwrap().push(RecordedRequest {
                method,
                path,
                body: String::from_utf8_lossy(&body).to_string(),
            });

            let (status, body) = response.unwrap_or_else(|| {
                // Default 404 for unmatched requests
                (404, not_found_json("resource", "unknown"))
            });
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

/// Create a 409 conflict response
pub fn conflict_json(name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("Operation cannot be fulfilled on klusters.vedratan.dev \"{}\": the object has been modified", name),
        "reason": "Conflict",
        "code": 409
    })
    .to_string()
}

/// Create a Secret JSON document holding a single data key
pub fn secret_json(namespace: &str, name: &str, key: &str, value: &str) -> String {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            key.to_string(),
            ByteString(value.as_bytes().to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    let mut json = serde_json::to_value(&secret).unwrap();
    json["apiVersion"] = "v1".into();
    json["kind"] = "Secret".into();
    json.to_string()
}

/// The "demo" Kluster used across tests
pub fn demo_kluster() -> Kluster {
    Kluster {
        metadata: ObjectMeta {
            name: Some("demo".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("0b6f2c1e-7a4d-4f38-9d8e-2f4b1c0a9e77".to_string()),
            resource_version: Some("100".to_string()),
            ..Default::default()
        },
        spec: KlusterSpec {
            name: "demo".to_string(),
            region: "nyc1".to_string(),
            version: "1.28".to_string(),
            node_pools: vec![NodePool {
                name: "pool1".to_string(),
                size: "s-2vcpu-4gb".to_string(),
                count: 2,
            }],
            token_secret: "default/dosecret".to_string(),
        },
        status: None,
    }
}

/// Serialize a Kluster as the API server would return it
pub fn kluster_json(kluster: &Kluster) -> String {
    let mut json = serde_json::to_value(kluster).unwrap();
    json["apiVersion"] = "vedratan.dev/v1alpha1".into();
    json["kind"] = "Kluster".into();
    json.to_string()
}

/// A reflector store pre-populated with the given objects
pub fn store_with(klusters: Vec<Kluster>) -> (Store<Kluster>, reflector::store::Writer<Kluster>) {
    let (reader, mut writer) = reflector::store();
    for kluster in klusters {
        writer.apply_watcher_event(&watcher::Event::Apply(kluster));
    }
    (reader, writer)
}

/// In-memory provisioning backend with scripted cluster states
#[derive(Default)]
pub struct FakeProvider {
    pub created: Mutex<Vec<CreateClusterRequest>>,
    pub states: Mutex<VecDeque<std::result::Result<ClusterState, ProviderError>>>,
    pub state_queries: Mutex<Vec<String>>,
    pub tagged: Mutex<HashMap<String, String>>,
    pub deleted: Mutex<Vec<String>>,
    pub find_calls: Mutex<u32>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answers of successive state queries; once exhausted the
    /// cluster keeps reporting "provisioning"
    pub fn with_states(self, states: Vec<ClusterState>) -> Self {
        *self.states.lock().unwrap() = states.into_iter().map(Ok).collect();
        self
    }

    pub fn with_state_error(self, error: ProviderError) -> Self {
        self.states.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_existing(self, tag: &str, id: &str) -> Self {
        self.tagged
            .lock()
            .unwrap()
            .insert(tag.to_string(), id.to_string());
        self
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn find_count(&self) -> u32 {
        *self.find_calls.lock().unwrap()
    }

    pub fn state_query_count(&self) -> usize {
        self.state_queries.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ProvisioningClient for FakeProvider {
    async fn create_cluster(
        &self,
        _token: &ApiToken,
        request: &CreateClusterRequest,
    ) -> std::result::Result<String, ProviderError> {
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        let id = format!("do-cluster-{}", created.len());
        for tag in &request.tags {
            self.tagged.lock().unwrap().insert(tag.clone(), id.clone());
        }
        Ok(id)
    }

    async fn cluster_state(
        &self,
        _token: &ApiToken,
        cluster_id: &str,
    ) -> std::result::Result<ClusterState, ProviderError> {
        self.state_queries
            .lock()
            .unwrap()
            .push(cluster_id.to_string());
        self.states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ClusterState::Pending("provisioning".to_string())))
    }

    async fn find_cluster(
        &self,
        _token: &ApiToken,
        tag: &str,
    ) -> std::result::Result<Option<String>, ProviderError> {
        *self.find_calls.lock().unwrap() += 1;
        Ok(self.tagged.lock().unwrap().get(tag).cloned())
    }

    async fn delete_cluster(
        &self,
        _token: &ApiToken,
        cluster_id: &str,
    ) -> std::result::Result<(), ProviderError> {
        self.deleted.lock().unwrap().push(cluster_id.to_string());
        Ok(())
    }
}

/// In-memory status store enforcing the same rules as the API-backed writer
#[derive(Default)]
pub struct FakeStatusWriter {
    pub statuses: Mutex<HashMap<KlusterKey, KlusterStatus>>,
    pub updates: Mutex<Vec<StatusUpdate>>,
    pub finalized: Mutex<Vec<KlusterKey>>,
    pub with_finalizer: Mutex<Vec<KlusterKey>>,
}

impl FakeStatusWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(self, key: &KlusterKey, status: KlusterStatus) -> Self {
        self.statuses.lock().unwrap().insert(key.clone(), status);
        self
    }

    pub fn status(&self, key: &KlusterKey) -> KlusterStatus {
        self.statuses
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StatusWriter for FakeStatusWriter {
    async fn fetch_status(&self, key: &KlusterKey) -> Result<KlusterStatus> {
        Ok(self.status(key))
    }

    async fn update_status(&self, key: &KlusterKey, update: &StatusUpdate) -> Result<KlusterStatus> {
        let mut statuses = self.statuses.lock().unwrap();
        let status = statuses.entry(key.clone()).or_default();
        status.apply(update)?;
        self.updates.lock().unwrap().push(update.clone());
        Ok(status.clone())
    }

    async fn add_finalizer(&self, key: &KlusterKey) -> Result<()> {
        let mut keys = self.with_finalizer.lock().unwrap();
        if !keys.contains(key) {
            keys.push(key.clone());
        }
        Ok(())
    }

    async fn remove_finalizer(&self, key: &KlusterKey) -> Result<()> {
        self.with_finalizer.lock().unwrap().retain(|k| k != key);
        self.finalized.lock().unwrap().push(key.clone());
        Ok(())
    }
}

/// Token resolver backed by a fixed map
#[derive(Default)]
pub struct FakeTokenResolver {
    tokens: HashMap<String, String>,
    pub lookups: Mutex<Vec<SecretRef>>,
}

impl FakeTokenResolver {
    pub fn with_token(reference: &str, token: &str) -> Self {
        Self {
            tokens: HashMap::from([(reference.to_string(), token.to_string())]),
            lookups: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl TokenResolver for FakeTokenResolver {
    async fn resolve_token(&self, reference: &SecretRef) -> Result<ApiToken> {
        self.lookups.lock().unwrap().push(reference.clone());
        self.tokens
            .get(&reference.to_string())
            .map(|t| ApiToken::new(t.clone()))
            .ok_or_else(|| KlusterError::CredentialNotFound(reference.to_string()))
    }
}
