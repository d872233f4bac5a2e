// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Wires the watch, the work queue and a pool of reconcile workers together.

use crate::config::Config;
use crate::kubernetes::secrets::TokenResolver;
use crate::kubernetes::status::StatusWriter;
use crate::kubernetes::watch::{KlusterNotifier, WatchAdapter};
use crate::provider::ProvisioningClient;
use crate::queue::WorkQueue;
use crate::reconcilers::KlusterReconciler;
use crate::types::kluster::{Kluster, KlusterKey};
use anyhow::bail;
use kube::runtime::reflector::{self, store::Writer, Store};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct KlusterController {
    api: Api<Kluster>,
    store: Store<Kluster>,
    writer: Writer<Kluster>,
    queue: WorkQueue<KlusterKey>,
    reconciler: Arc<KlusterReconciler>,
    workers: usize,
    shutdown: CancellationToken,
}

impl KlusterController {
    pub fn new(
        client: Client,
        config: &Config,
        status: Arc<dyn StatusWriter>,
        credentials: Arc<dyn TokenResolver>,
        provider: Arc<dyn ProvisioningClient>,
        shutdown: CancellationToken,
    ) -> Self {
        let (store, writer) = reflector::store();
        let reconciler = KlusterReconciler::new(
            store.clone(),
            status,
            credentials,
            provider,
            config,
            shutdown.clone(),
        );

        Self {
            api: Api::all(client),
            store,
            writer,
            queue: WorkQueue::new(config.retry_base_delay, config.retry_max_delay),
            reconciler: Arc::new(reconciler),
            workers: config.workers,
            shutdown,
        }
    }

    /// Run until the shutdown token fires, then drain the workers
    pub async fn run(self) -> anyhow::Result<()> {
        let (key_tx, key_rx) = mpsc::channel(256);
        let watch = WatchAdapter::new(self.api, self.writer, KlusterNotifier::new(key_tx));
        let watch_task = tokio::spawn(watch.run(self.shutdown.clone()));
        let forwarder = tokio::spawn(forward_keys(key_rx, self.queue.clone()));

        let workers = match start_workers(
            &self.store,
            &self.queue,
            &self.reconciler,
            self.workers,
            &self.shutdown,
        )
        .await
        {
            Ok(Some(workers)) => workers,
            Ok(None) => {
                info!("Shutdown requested before the cache synced");
                self.queue.shut_down();
                let _ = watch_task.await;
                return Ok(());
            }
            Err(e) => {
                self.queue.shut_down();
                return Err(e);
            }
        };

        self.shutdown.cancelled().await;
        info!("Shutting down controller...");
        self.queue.shut_down();

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker task failed to complete: {}", e);
            }
        }
        if let Err(e) = watch_task.await {
            error!("Watch task failed to complete: {}", e);
        }
        let _ = forwarder.await;

        info!("Controller stopped");
        Ok(())
    }
}

/// Wait until the cache holds the complete initial listing, then spawn
/// `count` workers. Returns `None` if shutdown comes first.
async fn start_workers(
    store: &Store<Kluster>,
    queue: &WorkQueue<KlusterKey>,
    reconciler: &Arc<KlusterReconciler>,
    count: usize,
    shutdown: &CancellationToken,
) -> anyhow::Result<Option<Vec<JoinHandle<()>>>> {
    info!("Waiting for the kluster cache to sync...");
    tokio::select! {
        _ = shutdown.cancelled() => return Ok(None),
        ready = store.wait_until_ready() => {
            if ready.is_err() {
                bail!("Kluster watch stopped before the initial listing completed");
            }
        }
    }
    info!(
        "Kluster cache synced ({} resources), starting {} workers",
        store.state().len(),
        count
    );

    let workers = (0..count)
        .map(|id| {
            let queue = queue.clone();
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                while process_next_item(&queue, &reconciler).await {}
                debug!("Worker {} stopped", id);
            })
        })
        .collect();
    Ok(Some(workers))
}

async fn forward_keys(mut key_rx: mpsc::Receiver<KlusterKey>, queue: WorkQueue<KlusterKey>) {
    while let Some(key) = key_rx.recv().await {
        queue.add(key).await;
    }
}

/// Take one key off the queue and reconcile it. Returns `false` once the
/// queue has shut down.
pub async fn process_next_item(queue: &WorkQueue<KlusterKey>, reconciler: &KlusterReconciler) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    match reconciler.reconcile(&key).await {
        Ok(outcome) => {
            debug!("Reconciled kluster {}: {:?}", key, outcome);
            queue.forget(&key).await;
        }
        Err(e) if e.is_retryable() => {
            warn!(
                "Reconciling kluster {} failed (retry {}): {}",
                key,
                queue.num_requeues(&key).await + 1,
                e
            );
            queue.add_rate_limited(key.clone()).await;
        }
        Err(e) => {
            error!("Reconciling kluster {} failed permanently: {}", key, e);
            reconciler.record_error(&key, &e).await;
            queue.forget(&key).await;
        }
    }

    queue.done(&key).await;
    true
}
