// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for client creation, CRD discovery, watching,
//! credential lookup and status writes.

pub mod client;
pub mod crd;
pub mod secrets;
pub mod status;
pub mod watch;

pub use client::create_client;
pub use crd::wait_for_kluster_crd;
pub use secrets::{ApiToken, KubeSecretResolver, SecretRef, TokenResolver};
pub use status::{KubeStatusWriter, StatusWriter};
pub use watch::{KlusterNotifier, WatchAdapter};
