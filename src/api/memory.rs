// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory resource API.
//!
//! Stores objects as JSON keyed by `(kind, tenant, namespace, name)` and
//! behaves like the API server where the controller can observe it:
//!
//! - `get` of a missing object fails with `NotFound`, `create` of an existing
//!   one with `AlreadyExists`
//! - Network status updates are checked against the stored resourceVersion
//! - every successful mutation is recorded in a write log
//! - Network changes are broadcast to watchers and replayed from history
//!
//! Failures can be injected one call at a time with [`MemoryResourceApi::fail_next`].

use super::{
    ManagedResource, NetworkEvent, NetworkEventStream, NetworkSnapshot, NetworkSource,
    ProvisionEvent, ResourceApi, Scope, TenantNetwork,
};
use crate::constants::KIND_NETWORK;
use crate::crd::{Network, NetworkStatus};
use crate::errors::ApiError;
use crate::key::NetworkKey;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

const WATCH_CHANNEL_CAPACITY: usize = 256;

/// The resource API call a failure is injected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Get,
    Create,
    UpdateStatus,
    PublishEvent,
}

/// A mutation accepted by the store.
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Create {
        kind: String,
        scope: Scope,
        name: String,
    },
    UpdateStatus {
        key: NetworkKey,
        status: Option<NetworkStatus>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    kind: String,
    scope: Scope,
    name: String,
}

struct InjectedFailure {
    operation: Operation,
    kind: String,
    error: ApiError,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, serde_json::Value>,
    networks: BTreeMap<NetworkKey, Network>,
    history: Vec<(u64, NetworkEvent)>,
    writes: Vec<Write>,
    events: Vec<ProvisionEvent>,
    failures: Vec<InjectedFailure>,
    next_service_ip: Option<u32>,
    resource_version: u64,
}

impl State {
    fn next_resource_version(&mut self) -> u64 {
        self.resource_version += 1;
        self.resource_version
    }

    fn take_failure(&mut self, operation: Operation, kind: &str) -> Option<ApiError> {
        let index = self
            .failures
            .iter()
            .position(|f| f.operation == operation && f.kind == kind)?;
        Some(self.failures.remove(index).error)
    }

    fn allocate_service_ip(&mut self) -> Option<String> {
        let next = self.next_service_ip?;
        self.next_service_ip = Some(next.wrapping_add(1));
        Some(Ipv4Addr::from(next).to_string())
    }
}

/// In-process implementation of [`ResourceApi`] and [`NetworkSource`].
pub struct MemoryResourceApi {
    state: Mutex<State>,
    watch_tx: broadcast::Sender<(u64, NetworkEvent)>,
}

impl Default for MemoryResourceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResourceApi {
    /// A store where Services are created without a cluster IP.
    #[must_use]
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            watch_tx,
        }
    }

    /// A store that assigns cluster IPs to created Services, counting up from `first`.
    #[must_use]
    pub fn with_service_ip_allocation(first: Ipv4Addr) -> Self {
        let api = Self::new();
        api.lock().next_service_ip = Some(u32::from(first));
        api
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, state: &mut State, rv: u64, event: NetworkEvent) {
        state.history.push((rv, event.clone()));
        // No receivers is fine; history covers late watchers.
        let _ = self.watch_tx.send((rv, event));
    }

    /// Make the next `operation` on `kind` fail with `error`.
    pub fn fail_next(&self, operation: Operation, kind: &str, error: ApiError) {
        self.lock().failures.push(InjectedFailure {
            operation,
            kind: kind.to_string(),
            error,
        });
    }

    /// Store a Network as if a tenant created it. Returns the stored object.
    pub fn insert_network(&self, key: &NetworkKey, network: Network) -> Network {
        let mut state = self.lock();
        let rv = state.next_resource_version();
        let mut network = network;
        network.metadata.name = Some(key.name.clone());
        network.metadata.resource_version = Some(rv.to_string());
        if network.metadata.uid.is_none() {
            network.metadata.uid = Some(format!("uid-{}-{}", key.tenant, key.name));
        }
        state.networks.insert(key.clone(), network.clone());
        let event = NetworkEvent::Applied(TenantNetwork {
            key: key.clone(),
            network: network.clone(),
        });
        self.broadcast(&mut state, rv, event);
        network
    }

    /// Set the deletion marker on a stored Network.
    pub fn mark_network_deleting(&self, key: &NetworkKey) -> Option<Network> {
        let mut state = self.lock();
        let rv = state.next_resource_version();
        let network = state.networks.get_mut(key)?;
        network.metadata.deletion_timestamp = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        network.metadata.resource_version = Some(rv.to_string());
        let network = network.clone();
        let event = NetworkEvent::Applied(TenantNetwork {
            key: key.clone(),
            network: network.clone(),
        });
        self.broadcast(&mut state, rv, event);
        Some(network)
    }

    /// Remove a Network entirely.
    pub fn remove_network(&self, key: &NetworkKey) -> Option<Network> {
        let mut state = self.lock();
        let network = state.networks.remove(key)?;
        let rv = state.next_resource_version();
        let event = NetworkEvent::Deleted(TenantNetwork {
            key: key.clone(),
            network: network.clone(),
        });
        self.broadcast(&mut state, rv, event);
        Some(network)
    }

    #[must_use]
    pub fn network(&self, key: &NetworkKey) -> Option<Network> {
        self.lock().networks.get(key).cloned()
    }

    /// Read a stored object without going through the failure injection.
    #[must_use]
    pub fn object<K: ManagedResource>(&self, scope: &Scope, name: &str) -> Option<K> {
        let object_key = ObjectKey {
            kind: K::kind(&()).to_string(),
            scope: scope.clone(),
            name: name.to_string(),
        };
        let value = self.lock().objects.get(&object_key).cloned()?;
        serde_json::from_value(value).ok()
    }

    /// Seed an object directly, bypassing the write log.
    pub fn seed<K: ManagedResource>(&self, scope: &Scope, object: &K) {
        let name = object.meta().name.clone().unwrap_or_default();
        let object_key = ObjectKey {
            kind: K::kind(&()).to_string(),
            scope: scope.clone(),
            name,
        };
        if let Ok(value) = serde_json::to_value(object) {
            self.lock().objects.insert(object_key, value);
        }
    }

    /// Set the cluster IP of a stored Service, as an external allocator would.
    ///
    /// Returns `false` if the Service does not exist.
    pub fn set_service_cluster_ip(&self, scope: &Scope, name: &str, ip: &str) -> bool {
        let object_key = ObjectKey {
            kind: "Service".to_string(),
            scope: scope.clone(),
            name: name.to_string(),
        };
        let mut state = self.lock();
        match state.objects.get_mut(&object_key) {
            Some(value) => {
                value["spec"]["clusterIP"] = serde_json::Value::String(ip.to_string());
                true
            }
            None => false,
        }
    }

    /// Number of stored objects of `kind` across all tenants.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.lock()
            .objects
            .keys()
            .filter(|k| k.kind == kind)
            .count()
    }

    /// Every accepted mutation, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<Write> {
        self.lock().writes.clone()
    }

    /// Only the status updates from the write log.
    #[must_use]
    pub fn status_writes(&self) -> Vec<Write> {
        self.writes()
            .into_iter()
            .filter(|w| matches!(w, Write::UpdateStatus { .. }))
            .collect()
    }

    /// Every event accepted by [`ResourceApi::publish_event`].
    #[must_use]
    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.lock().events.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.events.clear();
    }
}

#[async_trait]
impl ResourceApi for MemoryResourceApi {
    async fn get<K: ManagedResource>(&self, scope: &Scope, name: &str) -> Result<K, ApiError> {
        let kind = K::kind(&()).to_string();
        let value = {
            let mut state = self.lock();
            if let Some(error) = state.take_failure(Operation::Get, &kind) {
                return Err(error);
            }
            if kind == KIND_NETWORK {
                let key = NetworkKey::new(&scope.tenant, name);
                let network = state.networks.get(&key).cloned();
                network.map(serde_json::to_value).transpose()
            } else {
                let object_key = ObjectKey {
                    kind: kind.clone(),
                    scope: scope.clone(),
                    name: name.to_string(),
                };
                Ok(state.objects.get(&object_key).cloned())
            }
        };

        match value {
            Ok(Some(value)) => serde_json::from_value(value)
                .map_err(|e| ApiError::Transient(format!("failed to decode {kind}: {e}"))),
            Ok(None) => Err(ApiError::not_found(kind, name)),
            Err(e) => Err(ApiError::Transient(e.to_string())),
        }
    }

    async fn create<K: ManagedResource>(&self, scope: &Scope, object: &K) -> Result<K, ApiError> {
        let kind = K::kind(&()).to_string();
        let name = object.meta().name.clone().unwrap_or_default();
        let object_key = ObjectKey {
            kind: kind.clone(),
            scope: scope.clone(),
            name: name.clone(),
        };

        let value = {
            let mut state = self.lock();
            if let Some(error) = state.take_failure(Operation::Create, &kind) {
                return Err(error);
            }
            if state.objects.contains_key(&object_key) {
                return Err(ApiError::already_exists(kind, name));
            }

            let rv = state.next_resource_version();
            let mut stored = object.clone();
            stored.meta_mut().resource_version = Some(rv.to_string());
            stored.meta_mut().uid = Some(format!("uid-{rv}"));
            let mut value = serde_json::to_value(&stored)
                .map_err(|e| ApiError::Transient(format!("failed to encode {kind}: {e}")))?;

            if kind == "Service" {
                if let Some(ip) = state.allocate_service_ip() {
                    value["spec"]["clusterIP"] = serde_json::Value::String(ip);
                }
            }

            state.objects.insert(object_key, value.clone());
            state.writes.push(Write::Create {
                kind: kind.clone(),
                scope: scope.clone(),
                name: name.clone(),
            });
            value
        };

        debug!(scope = %scope, kind = %kind, name = %name, "Stored object");
        serde_json::from_value(value)
            .map_err(|e| ApiError::Transient(format!("failed to decode {kind}: {e}")))
    }

    async fn update_network_status(
        &self,
        key: &NetworkKey,
        network: &Network,
    ) -> Result<Network, ApiError> {
        let mut state = self.lock();
        if let Some(error) = state.take_failure(Operation::UpdateStatus, KIND_NETWORK) {
            return Err(error);
        }

        let current_version = match state.networks.get(key) {
            Some(current) => current.metadata.resource_version.clone(),
            None => return Err(ApiError::not_found(KIND_NETWORK, &key.name)),
        };
        if network.metadata.resource_version != current_version {
            return Err(ApiError::Conflict {
                kind: KIND_NETWORK.to_string(),
                name: key.name.clone(),
                message: format!(
                    "resourceVersion {:?} is stale, current is {:?}",
                    network.metadata.resource_version, current_version
                ),
            });
        }

        let rv = state.next_resource_version();
        let updated = match state.networks.get_mut(key) {
            Some(current) => {
                current.status = network.status.clone();
                current.metadata.resource_version = Some(rv.to_string());
                current.clone()
            }
            None => return Err(ApiError::not_found(KIND_NETWORK, &key.name)),
        };
        state.writes.push(Write::UpdateStatus {
            key: key.clone(),
            status: updated.status.clone(),
        });
        let event = NetworkEvent::Applied(TenantNetwork {
            key: key.clone(),
            network: updated.clone(),
        });
        self.broadcast(&mut state, rv, event);
        Ok(updated)
    }

    async fn publish_event(&self, event: &ProvisionEvent) -> Result<(), ApiError> {
        let mut state = self.lock();
        if let Some(error) = state.take_failure(Operation::PublishEvent, "Event") {
            return Err(error);
        }
        state.events.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl NetworkSource for MemoryResourceApi {
    async fn list_networks(&self) -> Result<NetworkSnapshot, ApiError> {
        let state = self.lock();
        let items = state
            .networks
            .iter()
            .map(|(key, network)| TenantNetwork {
                key: key.clone(),
                network: network.clone(),
            })
            .collect();
        Ok(NetworkSnapshot {
            items,
            resource_version: state.resource_version.to_string(),
        })
    }

    async fn watch_networks(&self, resource_version: &str) -> Result<NetworkEventStream, ApiError> {
        let since: u64 = resource_version.parse().unwrap_or(0);

        // Subscribe and snapshot history under one lock so no event falls in between.
        let (replay, rx) = {
            let state = self.lock();
            let replay: Vec<(u64, NetworkEvent)> = state
                .history
                .iter()
                .filter(|(rv, _)| *rv > since)
                .cloned()
                .collect();
            (replay, self.watch_tx.subscribe())
        };
        let last_replayed = replay.last().map_or(since, |(rv, _)| *rv);

        let live = futures::stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok((rv, _)) if rv <= last_replayed => continue,
                    Ok((_, event)) => return Some((Ok(event), rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        return Some((
                            Err(ApiError::Transient(format!(
                                "watch fell behind by {skipped} events"
                            ))),
                            rx,
                        ));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(futures::stream::iter(replay.into_iter().map(|(_, event)| Ok(event)))
            .chain(live)
            .boxed())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
