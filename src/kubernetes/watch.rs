// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watch adapter: keeps the local Kluster cache current and tells the work
//! queue which keys changed.

use crate::types::kluster::{Kluster, KlusterKey};
use futures::StreamExt;
use kube::runtime::reflector::store::Writer;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Api;
use kube_runtime::watcher::Config as WatcherConfig;
use std::pin::pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handle the watch adapter uses to report changed keys
#[derive(Clone)]
pub struct KlusterNotifier {
    key_tx: mpsc::Sender<KlusterKey>,
}

impl KlusterNotifier {
    pub fn new(key_tx: mpsc::Sender<KlusterKey>) -> Self {
        Self { key_tx }
    }

    pub async fn notify(&self, key: KlusterKey) {
        if let Err(e) = self.key_tx.send(key).await {
            error!("Failed to hand kluster {} to the work queue: receiver closed", e.0);
        }
    }
}

pub struct WatchAdapter {
    api: Api<Kluster>,
    writer: Writer<Kluster>,
    notifier: KlusterNotifier,
}

impl WatchAdapter {
    pub fn new(api: Api<Kluster>, writer: Writer<Kluster>, notifier: KlusterNotifier) -> Self {
        Self {
            api,
            writer,
            notifier,
        }
    }

    /// Run until the watch stream ends or `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let stream = watcher(self.api, WatcherConfig::default())
            .default_backoff()
            .reflect(self.writer);
        let mut stream = pin!(stream);

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = stream.next() => event,
            };

            match event {
                Some(Ok(event)) => handle_event(&self.notifier, event).await,
                Some(Err(e)) => warn!("Kluster watch error: {}", e),
                None => {
                    warn!("Kluster watch stream ended");
                    break;
                }
            }
        }

        info!("Kluster watch stopped");
    }
}

async fn handle_event(notifier: &KlusterNotifier, event: watcher::Event<Kluster>) {
    match event {
        watcher::Event::Apply(kluster) | watcher::Event::InitApply(kluster) => {
            debug!("Kluster {} added or updated", kluster.key());
            notifier.notify(kluster.key()).await;
        }
        watcher::Event::Delete(kluster) => {
            info!("Kluster {} deleted", kluster.key());
            notifier.notify(kluster.key()).await;
        }
        watcher::Event::Init => debug!("Kluster watch (re)listing"),
        watcher::Event::InitDone => debug!("Kluster watch initial listing complete"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::demo_kluster;

    #[tokio::test]
    async fn test_apply_and_delete_events_notify_key() {
        let (tx, mut rx) = mpsc::channel(8);
        let notifier = KlusterNotifier::new(tx);

        handle_event(&notifier, watcher::Event::Apply(demo_kluster())).await;
        handle_event(&notifier, watcher::Event::InitApply(demo_kluster())).await;
        handle_event(&notifier, watcher::Event::Delete(demo_kluster())).await;
        handle_event(&notifier, watcher::Event::InitDone).await;
        drop(notifier);

        let mut keys = Vec::new();
        while let Some(key) = rx.recv().await {
            keys.push(key);
        }
        assert_eq!(keys, vec![KlusterKey::new("default", "demo"); 3]);
    }
}
