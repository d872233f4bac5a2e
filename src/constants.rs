// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// API group of the Kluster custom resource
pub const API_GROUP: &str = "vedratan.dev";

/// Finalizer that holds a Kluster until its remote cluster is torn down
pub const FINALIZER: &str = "vedratan.dev/kluster-cleanup";

/// Prefix of the idempotency tag attached to every remote cluster we create
pub const IDEMPOTENCY_TAG_PREFIX: &str = "kluster";

/// Status writes retried on optimistic-lock conflicts
pub const STATUS_UPDATE_ATTEMPTS: u32 = 5;

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Defaults for values that can be overridden from the environment
pub mod defaults {
    pub const WORKERS: usize = 1;
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Overall deadline for a cluster to reach "running"
    pub const POLL_TIMEOUT_SECS: u64 = 600;
    pub const RETRY_BASE_DELAY_MS: u64 = 5;
    pub const RETRY_MAX_DELAY_SECS: u64 = 1000;
    pub const DIGITALOCEAN_API_URL: &str = "https://api.digitalocean.com";
    pub const TOKEN_SECRET_KEY: &str = "token";
}
