// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Credential resolution from Kubernetes Secrets

use crate::error::{KlusterError, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// A cloud API token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        ApiToken(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(<redacted>)")
    }
}

/// A `namespace/name` reference to a Secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

impl FromStr for SecretRef {
    type Err = KlusterError;

    fn from_str(s: &str) -> Result<Self> {
        let Some((namespace, name)) = s.split_once('/') else {
            return Err(KlusterError::InvalidReference(format!(
                "{:?} is not of the form namespace/name",
                s
            )));
        };

        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(KlusterError::InvalidReference(format!(
                "{:?} must have exactly two non-empty segments",
                s
            )));
        }

        Ok(SecretRef {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Resolves the API token a Kluster refers to.
#[async_trait::async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve_token(&self, reference: &SecretRef) -> Result<ApiToken>;
}

/// Reads tokens from Secrets through the Kubernetes API
pub struct KubeSecretResolver {
    client: Client,
    key: String,
}

impl KubeSecretResolver {
    /// `key` is the Secret data key holding the token
    pub fn new(client: Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenResolver for KubeSecretResolver {
    #[instrument(skip(self), fields(secret = %reference))]
    async fn resolve_token(&self, reference: &SecretRef) -> Result<ApiToken> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &reference.namespace);

        let secret = match secrets.get(&reference.name).await {
            Ok(s) => s,
            Err(kube::Error::Api(err)) if err.code == 404 => {
                return Err(KlusterError::CredentialNotFound(format!(
                    "secret {} does not exist",
                    reference
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(value) = secret.data.as_ref().and_then(|d| d.get(&self.key)) else {
            return Err(KlusterError::CredentialNotFound(format!(
                "secret {} does not contain '{}' key",
                reference, self.key
            )));
        };

        let token = String::from_utf8(value.0.clone()).map_err(|e| {
            KlusterError::CredentialNotFound(format!(
                "secret {} key '{}' is not valid UTF-8: {}",
                reference, self.key, e
            ))
        })?;

        let token = token.trim();
        if token.is_empty() {
            return Err(KlusterError::CredentialNotFound(format!(
                "secret {} key '{}' is empty",
                reference, self.key
            )));
        }

        debug!("Resolved API token from secret {}", reference);
        Ok(ApiToken::new(token))
    }
}
