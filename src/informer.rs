// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! List+watch informer for Networks across all tenants.
//!
//! The informer keeps a local cache ([`NetworkStore`]) that the controller reads
//! without touching the API server, delivers add/update/delete notifications to
//! a [`NetworkHandler`], and flips a HasSynced signal after the first complete
//! list. When a watch expires or fails it re-lists and diffs against the cache.

use crate::api::{NetworkEvent, NetworkSource, TenantNetwork};
use crate::constants::RELIST_BACKOFF_SECS;
use crate::crd::Network;
use crate::key::NetworkKey;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Receives cache changes. Called from the informer task; must not block.
pub trait NetworkHandler: Send + Sync {
    fn on_add(&self, network: &TenantNetwork);
    fn on_update(&self, old: &TenantNetwork, new: &TenantNetwork);
    fn on_delete(&self, network: &TenantNetwork);
}

/// Read-only (to consumers) cache of Networks keyed by `(tenant, name)`.
#[derive(Clone, Default)]
pub struct NetworkStore {
    inner: Arc<RwLock<HashMap<NetworkKey, Arc<Network>>>>,
}

impl NetworkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &NetworkKey) -> Option<Arc<Network>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of every cached Network, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<NetworkKey> {
        let mut keys: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Insert or replace; returns the previous entry.
    pub fn insert(&self, key: NetworkKey, network: Network) -> Option<Arc<Network>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(network))
    }

    pub fn remove(&self, key: &NetworkKey) -> Option<Arc<Network>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

/// HasSynced signal of an informer.
#[derive(Clone)]
pub struct SyncSignal {
    rx: watch::Receiver<bool>,
}

impl SyncSignal {
    #[must_use]
    pub fn has_synced(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the first list has been applied to the cache.
    /// Returns `false` if the informer went away before syncing.
    pub async fn wait(&mut self) -> bool {
        self.rx.wait_for(|synced| *synced).await.is_ok()
    }
}

fn to_tenant_network(key: &NetworkKey, network: &Network) -> TenantNetwork {
    TenantNetwork {
        key: key.clone(),
        network: network.clone(),
    }
}

/// List+watch loop feeding a [`NetworkStore`].
pub struct Informer<S> {
    source: Arc<S>,
    store: NetworkStore,
    handler: Arc<dyn NetworkHandler>,
    synced_tx: watch::Sender<bool>,
    synced_rx: watch::Receiver<bool>,
}

impl<S: NetworkSource> Informer<S> {
    pub fn new(source: Arc<S>, handler: Arc<dyn NetworkHandler>) -> Self {
        let (synced_tx, synced_rx) = watch::channel(false);
        Self {
            source,
            store: NetworkStore::new(),
            handler,
            synced_tx,
            synced_rx,
        }
    }

    /// The cache this informer maintains.
    #[must_use]
    pub fn store(&self) -> NetworkStore {
        self.store.clone()
    }

    #[must_use]
    pub fn sync_signal(&self) -> SyncSignal {
        SyncSignal {
            rx: self.synced_rx.clone(),
        }
    }

    /// Run until `stop` turns true (or its sender is dropped).
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("Starting network informer");
        loop {
            if *stop.borrow() {
                break;
            }

            let resource_version = match self.relist().await {
                Some(rv) => rv,
                None => {
                    if sleep_or_stop(&mut stop, Duration::from_secs(RELIST_BACKOFF_SECS)).await {
                        break;
                    }
                    continue;
                }
            };

            let stopped = tokio::select! {
                () = self.watch_from(resource_version) => false,
                _ = stop.wait_for(|s| *s) => true,
            };
            if stopped {
                break;
            }
            debug!("Network watch ended, re-listing");
        }
        info!("Network informer stopped");
    }

    /// List everything, reconcile the cache with the listing, and mark synced.
    /// Returns the version to watch from, or `None` on failure.
    async fn relist(&self) -> Option<String> {
        let snapshot = match self.source.list_networks().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to list networks");
                return None;
            }
        };

        let mut listed = HashMap::with_capacity(snapshot.items.len());
        for item in snapshot.items {
            listed.insert(item.key.clone(), item);
        }

        for key in self.store.keys() {
            if !listed.contains_key(&key) {
                if let Some(old) = self.store.remove(&key) {
                    self.handler.on_delete(&to_tenant_network(&key, &old));
                }
            }
        }
        for item in listed.into_values() {
            self.apply(item);
        }

        if !*self.synced_tx.borrow() {
            info!(count = self.store.len(), "Network cache synced");
        }
        self.synced_tx.send_replace(true);
        Some(snapshot.resource_version)
    }

    async fn watch_from(&self, resource_version: String) {
        let mut stream = match self.source.watch_networks(&resource_version).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to start network watch");
                tokio::time::sleep(Duration::from_secs(RELIST_BACKOFF_SECS)).await;
                return;
            }
        };

        while let Some(event) = stream.next().await {
            match event {
                Ok(NetworkEvent::Applied(item)) => self.apply(item),
                Ok(NetworkEvent::Deleted(item)) => {
                    self.store.remove(&item.key);
                    self.handler.on_delete(&item);
                }
                Ok(NetworkEvent::Bookmark(rv)) => {
                    debug!(resource_version = %rv, "Network watch bookmark");
                }
                Err(e) => {
                    warn!(error = %e, "Network watch failed");
                    return;
                }
            }
        }
    }

    fn apply(&self, item: TenantNetwork) {
        let previous = self.store.insert(item.key.clone(), item.network.clone());
        match previous {
            Some(old) => self
                .handler
                .on_update(&to_tenant_network(&item.key, &old), &item),
            None => self.handler.on_add(&item),
        }
    }
}

/// Sleep for `delay`; returns `true` if `stop` fired first.
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        _ = stop.wait_for(|s| *s) => true,
    }
}

#[cfg(test)]
#[path = "informer_tests.rs"]
mod informer_tests;
