// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Network controller: event-to-key adapter, worker loop and lifecycle.
//!
//! Informer notifications become `tenant/name` keys in a [`WorkQueue`].
//! Workers take keys off the queue, look the Network up in the informer cache
//! and hand it to [`reconcile_network`]. The queue guarantees at most one
//! reconcile per Network at any time.

use crate::api::{ResourceApi, TenantNetwork};
use crate::constants::{PENDING_RECHECK_SECS, WORKER_RESTART_PERIOD_SECS};
use crate::dns_resources::DnsSettings;
use crate::errors::ControllerError;
use crate::informer::{NetworkHandler, NetworkStore, SyncSignal};
use crate::key::decode_key;
use crate::reconcilers::{reconcile_network, ReconcileOutcome};
use crate::workqueue::WorkQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Turns informer notifications into queue keys.
///
/// Only the new object's identity is used; the worker always re-reads the
/// cache. Deletions are ignored since cleanup is not performed.
pub struct QueueingHandler {
    queue: WorkQueue<String>,
}

impl QueueingHandler {
    #[must_use]
    pub fn new(queue: WorkQueue<String>) -> Self {
        Self { queue }
    }
}

impl NetworkHandler for QueueingHandler {
    fn on_add(&self, network: &TenantNetwork) {
        trace!(key = %network.key, "Network added");
        self.queue.add(network.key.encode());
    }

    fn on_update(&self, _old: &TenantNetwork, new: &TenantNetwork) {
        trace!(key = %new.key, "Network updated");
        self.queue.add(new.key.encode());
    }

    fn on_delete(&self, network: &TenantNetwork) {
        trace!(key = %network.key, "Network deleted, nothing to do");
    }
}

/// Calls [`WorkQueue::done`] when dropped, so a panicking reconcile still
/// releases its key.
struct DoneGuard<'a> {
    queue: &'a WorkQueue<String>,
    key: String,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(&self.key);
    }
}

/// Queue-driven reconciler for tenant Networks.
pub struct NetworkController<A> {
    api: Arc<A>,
    settings: Arc<DnsSettings>,
    store: NetworkStore,
    synced: SyncSignal,
    queue: WorkQueue<String>,
}

impl<A: ResourceApi + 'static> NetworkController<A> {
    /// Build a controller over an informer's cache.
    ///
    /// `queue` must be the queue the informer's [`QueueingHandler`] feeds.
    pub fn new(
        api: Arc<A>,
        settings: DnsSettings,
        store: NetworkStore,
        synced: SyncSignal,
        queue: WorkQueue<String>,
    ) -> Self {
        Self {
            api,
            settings: Arc::new(settings),
            store,
            synced,
            queue,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Run `workers` workers until `stop` turns true, then shut the queue down
    /// and wait for the workers to drain it.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::CacheSyncFailed`] if `stop` fires (or the
    /// informer goes away) before the cache has synced.
    pub async fn run(
        self: Arc<Self>,
        workers: usize,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        info!(workers, "Starting network controller");

        if !self.wait_for_cache_sync(&mut stop).await {
            error!("Timed out waiting for network cache to sync");
            self.queue.shut_down();
            return Err(ControllerError::CacheSyncFailed);
        }

        let handles: Vec<_> = (0..workers)
            .map(|id| tokio::spawn(Arc::clone(&self).supervise_worker(id)))
            .collect();
        info!(workers, "Network controller workers started");

        // A dropped sender counts as stop.
        let _ = stop.wait_for(|stopped| *stopped).await;

        info!("Shutting down network controller");
        self.queue.shut_down();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker supervisor ended abnormally");
            }
        }
        info!("Network controller stopped");
        Ok(())
    }

    async fn wait_for_cache_sync(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut synced = self.synced.clone();
        tokio::select! {
            ok = synced.wait() => ok,
            _ = stop.wait_for(|stopped| *stopped) => false,
        }
    }

    /// Keep one worker alive, restarting it after a panic.
    async fn supervise_worker(self: Arc<Self>, id: usize) {
        loop {
            let worker = Arc::clone(&self);
            match tokio::spawn(async move { worker.run_worker(id).await }).await {
                Ok(()) => return,
                Err(e) if e.is_panic() => {
                    error!(worker = id, "Worker panicked, restarting");
                    tokio::time::sleep(Duration::from_secs(WORKER_RESTART_PERIOD_SECS)).await;
                }
                Err(e) => {
                    error!(worker = id, error = %e, "Worker cancelled");
                    return;
                }
            }
        }
    }

    async fn run_worker(&self, id: usize) {
        debug!(worker = id, "Worker started");
        while self.process_next_work_item().await {}
        debug!(worker = id, "Worker stopped");
    }

    /// Handle one queue item. Returns `false` once the queue is shut down and empty.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let guard = DoneGuard {
            queue: &self.queue,
            key,
        };
        self.process_key(&guard.key).await;
        true
    }

    async fn process_key(&self, key: &str) {
        let network_key = match decode_key(key) {
            Ok(network_key) => network_key,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping malformed key");
                self.queue.forget(&key.to_string());
                return;
            }
        };

        let Some(network) = self.store.get(&network_key) else {
            debug!(key = %key, "Network no longer cached, dropping key");
            self.queue.forget(&key.to_string());
            return;
        };

        match reconcile_network(self.api.as_ref(), &self.settings, &network_key, &network).await {
            Ok(ReconcileOutcome::Pending { .. }) => {
                self.queue.forget(&key.to_string());
                self.queue
                    .add_after(key.to_string(), Duration::from_secs(PENDING_RECHECK_SECS));
            }
            Ok(outcome) => {
                trace!(
                    key = %key,
                    outcome = ?outcome,
                    status_updated = outcome.status_updated(),
                    "Reconcile succeeded"
                );
                self.queue.forget(&key.to_string());
            }
            Err(e) if e.is_transient() => {
                warn!(
                    key = %key,
                    requeues = self.queue.num_requeues(&key.to_string()),
                    error = %e,
                    "Reconcile failed, requeueing with backoff"
                );
                self.queue.add_rate_limited(key.to_string());
            }
            Err(e) => {
                let failed = e.key();
                error!(
                    tenant = %failed.tenant,
                    name = %failed.name,
                    error = %e,
                    "Reconcile failed permanently, dropping key"
                );
                self.queue.forget(&key.to_string());
            }
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
