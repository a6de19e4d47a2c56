// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tenant_network_controller::api::memory::MemoryResourceApi;
use tenant_network_controller::api::Scope;
use tenant_network_controller::controller::{NetworkController, QueueingHandler};
use tenant_network_controller::crd::{Network, NetworkSpec};
use tenant_network_controller::dns_resources::DnsSettings;
use tenant_network_controller::informer::Informer;
use tenant_network_controller::key::NetworkKey;
use tenant_network_controller::workqueue::WorkQueue;

/// A Network of the given type with an empty status
pub fn network(name: &str, type_: &str) -> Network {
    Network::new(
        name,
        NetworkSpec {
            type_: type_.to_string(),
            ..Default::default()
        },
    )
}

/// Key of the Network most scenarios use
pub fn key() -> NetworkKey {
    NetworkKey::new("t1", "n1")
}

/// The tenant's `kube-system` namespace
pub fn system_scope(tenant: &str) -> Scope {
    Scope::namespaced(tenant, "kube-system")
}

/// Wire a controller and its informer over one in-memory API
pub fn controller(
    api: &Arc<MemoryResourceApi>,
) -> (
    Arc<NetworkController<MemoryResourceApi>>,
    Informer<MemoryResourceApi>,
) {
    let queue = WorkQueue::new();
    let informer = Informer::new(
        Arc::clone(api),
        Arc::new(QueueingHandler::new(queue.clone())),
    );
    let controller = NetworkController::new(
        Arc::clone(api),
        DnsSettings::default(),
        informer.store(),
        informer.sync_signal(),
        queue,
    );
    (Arc::new(controller), informer)
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
