// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::defaults;
use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to a kubeconfig file; the in-cluster config is used when this is
    /// missing or unusable
    pub kubeconfig: Option<PathBuf>,
    /// Number of concurrent reconcile workers
    pub workers: usize,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub digitalocean_api_url: String,
    /// Data key of the credential secret that holds the API token
    pub token_secret_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            kubeconfig: None,
            workers: defaults::WORKERS,
            poll_interval: Duration::from_secs(defaults::POLL_INTERVAL_SECS),
            poll_timeout: Duration::from_secs(defaults::POLL_TIMEOUT_SECS),
            retry_base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_secs(defaults::RETRY_MAX_DELAY_SECS),
            digitalocean_api_url: defaults::DIGITALOCEAN_API_URL.to_string(),
            token_secret_key: defaults::TOKEN_SECRET_KEY.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let kubeconfig = lookup("KUBECONFIG")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".kube").join("config")));

        let workers: usize = parse_or(&lookup, "KLUSTER_WORKERS", defaults::WORKERS)?;
        if workers == 0 {
            bail!("KLUSTER_WORKERS must be at least 1");
        }

        let poll_interval = Duration::from_secs(parse_or(
            &lookup,
            "KLUSTER_POLL_INTERVAL_SECS",
            defaults::POLL_INTERVAL_SECS,
        )?);
        let poll_timeout = Duration::from_secs(parse_or(
            &lookup,
            "KLUSTER_POLL_TIMEOUT_SECS",
            defaults::POLL_TIMEOUT_SECS,
        )?);
        let retry_base_delay = Duration::from_millis(parse_or(
            &lookup,
            "KLUSTER_RETRY_BASE_DELAY_MS",
            defaults::RETRY_BASE_DELAY_MS,
        )?);
        let retry_max_delay = Duration::from_secs(parse_or(
            &lookup,
            "KLUSTER_RETRY_MAX_DELAY_SECS",
            defaults::RETRY_MAX_DELAY_SECS,
        )?);

        let digitalocean_api_url = lookup("DIGITALOCEAN_API_URL")
            .unwrap_or_else(|| defaults::DIGITALOCEAN_API_URL.to_string());
        let token_secret_key = lookup("KLUSTER_TOKEN_SECRET_KEY")
            .unwrap_or_else(|| defaults::TOKEN_SECRET_KEY.to_string());

        Ok(Config {
            kubeconfig,
            workers,
            poll_interval,
            poll_timeout,
            retry_base_delay,
            retry_max_delay,
            digitalocean_api_url,
            token_secret_key,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.kubeconfig, None);
        assert_eq!(config.workers, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.poll_timeout, Duration::from_secs(600));
        assert_eq!(config.digitalocean_api_url, "https://api.digitalocean.com");
        assert_eq!(config.token_secret_key, "token");
    }

    #[test]
    fn test_kubeconfig_defaults_to_home() {
        let config = Config::from_lookup(lookup_from(&[("HOME", "/home/ops")])).unwrap();
        assert_eq!(
            config.kubeconfig,
            Some(PathBuf::from("/home/ops/.kube/config"))
        );
    }

    #[test]
    fn test_explicit_kubeconfig_wins() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/ops"),
            ("KUBECONFIG", "/etc/kluster/kubeconfig"),
        ]))
        .unwrap();
        assert_eq!(
            config.kubeconfig,
            Some(PathBuf::from("/etc/kluster/kubeconfig"))
        );
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("KLUSTER_WORKERS", "4"),
            ("KLUSTER_POLL_INTERVAL_SECS", "3"),
            ("KLUSTER_POLL_TIMEOUT_SECS", "120"),
            ("DIGITALOCEAN_API_URL", "http://127.0.0.1:8080"),
        ]))
        .unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.poll_timeout, Duration::from_secs(120));
        assert_eq!(config.digitalocean_api_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("KLUSTER_WORKERS", "many")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[("KLUSTER_WORKERS", "0")]));
        assert!(result.is_err());
    }
}
