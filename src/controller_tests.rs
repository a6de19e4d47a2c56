// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `controller.rs`

#[cfg(test)]
mod tests {
    use crate::api::memory::MemoryResourceApi;
    use crate::api::{
        EventType, ManagedResource, NetworkEventStream, NetworkSnapshot, NetworkSource,
        ProvisionEvent, ResourceApi, Scope, TenantNetwork,
    };
    use crate::controller::{NetworkController, QueueingHandler};
    use crate::crd::{Network, NetworkPhase, NetworkSpec};
    use crate::dns_resources::DnsSettings;
    use crate::errors::{ApiError, ControllerError};
    use crate::informer::{Informer, NetworkHandler};
    use crate::key::NetworkKey;
    use crate::workqueue::WorkQueue;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    /// Wraps the in-memory API to count concurrent calls and inject one panic.
    struct InstrumentedApi {
        inner: MemoryResourceApi,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        panic_once: AtomicBool,
    }

    impl InstrumentedApi {
        fn new(inner: MemoryResourceApi) -> Self {
            Self {
                inner,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                panic_once: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ResourceApi for InstrumentedApi {
        async fn get<K: ManagedResource>(&self, scope: &Scope, name: &str) -> Result<K, ApiError> {
            if self.panic_once.swap(false, Ordering::SeqCst) {
                panic!("injected worker panic");
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            let result = self.inner.get(scope, name).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn create<K: ManagedResource>(
            &self,
            scope: &Scope,
            object: &K,
        ) -> Result<K, ApiError> {
            self.inner.create(scope, object).await
        }

        async fn update_network_status(
            &self,
            key: &NetworkKey,
            network: &Network,
        ) -> Result<Network, ApiError> {
            self.inner.update_network_status(key, network).await
        }

        async fn publish_event(&self, event: &ProvisionEvent) -> Result<(), ApiError> {
            self.inner.publish_event(event).await
        }
    }

    #[async_trait]
    impl NetworkSource for InstrumentedApi {
        async fn list_networks(&self) -> Result<NetworkSnapshot, ApiError> {
            self.inner.list_networks().await
        }

        async fn watch_networks(
            &self,
            resource_version: &str,
        ) -> Result<NetworkEventStream, ApiError> {
            self.inner.watch_networks(resource_version).await
        }
    }

    fn network(type_: &str) -> Network {
        Network::new(
            "n1",
            NetworkSpec {
                type_: type_.into(),
                ..Default::default()
            },
        )
    }

    fn key() -> NetworkKey {
        NetworkKey::new("t1", "n1")
    }

    fn build<A: ResourceApi + NetworkSource>(
        api: Arc<A>,
    ) -> (Arc<NetworkController<A>>, Informer<A>) {
        let queue = WorkQueue::new();
        let informer = Informer::new(
            Arc::clone(&api),
            Arc::new(QueueingHandler::new(queue.clone())),
        );
        let controller = NetworkController::new(
            api,
            DnsSettings::default(),
            informer.store(),
            informer.sync_signal(),
            queue,
        );
        (Arc::new(controller), informer)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_handler_enqueues_adds_and_updates_only() {
        let queue = WorkQueue::new();
        let handler = QueueingHandler::new(queue.clone());
        let item = TenantNetwork {
            key: key(),
            network: network("flat"),
        };
        handler.on_add(&item);
        handler.on_update(&item, &item);
        assert_eq!(queue.len(), 1);

        let other = TenantNetwork {
            key: NetworkKey::new("t2", "n9"),
            network: network("flat"),
        };
        handler.on_delete(&other);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_key_is_forgotten_and_released() {
        let api = Arc::new(MemoryResourceApi::new());
        let (controller, _informer) = build(api);
        controller.queue().add("no-separator".to_string());

        assert!(controller.process_next_work_item().await);
        assert!(controller.queue().is_empty());
        assert_eq!(controller.queue().num_requeues(&"no-separator".to_string()), 0);

        // Released: a new add is queued right away
        controller.queue().add("no-separator".to_string());
        assert_eq!(controller.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_uncached_network_is_forgotten() {
        let api = Arc::new(MemoryResourceApi::new());
        let (controller, _informer) = build(api);
        controller.queue().add(key().encode());

        assert!(controller.process_next_work_item().await);
        assert!(controller.queue().is_empty());
        assert_eq!(controller.queue().num_requeues(&key().encode()), 0);
    }

    #[tokio::test]
    async fn test_failed_reconcile_is_rate_limited() {
        // No IP allocation: a flat network cannot become ready
        let api = Arc::new(MemoryResourceApi::new());
        let (controller, informer) = build(Arc::clone(&api));
        let stored = api.insert_network(&key(), network("flat"));
        informer.store().insert(key(), stored);

        controller.queue().add(key().encode());
        assert!(controller.process_next_work_item().await);
        assert_eq!(controller.queue().num_requeues(&key().encode()), 1);
        assert_eq!(api.events().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_forgotten() {
        // The resolver config cannot be rendered for a name with whitespace
        let api = Arc::new(MemoryResourceApi::with_service_ip_allocation(
            Ipv4Addr::new(10, 0, 0, 10),
        ));
        let (controller, informer) = build(Arc::clone(&api));
        let bad = NetworkKey::new("t1", "bad name");
        let stored = api.insert_network(&bad, network("flat"));
        informer.store().insert(bad.clone(), stored);

        controller.queue().add(bad.encode());
        assert!(controller.process_next_work_item().await);
        assert_eq!(controller.queue().num_requeues(&bad.encode()), 0);
        assert!(controller.queue().is_empty());
        assert_eq!(api.count("ConfigMap"), 0);

        let events = api.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Warning);
    }

    #[tokio::test]
    async fn test_successful_reconcile_is_forgotten() {
        let api = Arc::new(MemoryResourceApi::with_service_ip_allocation(
            Ipv4Addr::new(10, 0, 0, 10),
        ));
        let (controller, informer) = build(Arc::clone(&api));
        let stored = api.insert_network(&key(), network("flat"));
        informer.store().insert(key(), stored);

        controller.queue().add(key().encode());
        assert!(controller.process_next_work_item().await);
        assert_eq!(controller.queue().num_requeues(&key().encode()), 0);
        assert!(controller.queue().is_empty());
        assert_eq!(api.network(&key()).unwrap().phase(), NetworkPhase::Ready);
    }

    #[tokio::test]
    async fn test_pending_reconcile_is_not_counted_as_failure() {
        let api = Arc::new(MemoryResourceApi::new());
        let (controller, informer) = build(Arc::clone(&api));
        let stored = api.insert_network(&key(), network("mizar"));
        informer.store().insert(key(), stored);

        controller.queue().add(key().encode());
        assert!(controller.process_next_work_item().await);
        assert_eq!(controller.queue().num_requeues(&key().encode()), 0);
        assert_eq!(api.network(&key()).unwrap().phase(), NetworkPhase::Pending);
    }

    #[tokio::test]
    async fn test_run_fails_when_stopped_before_sync() {
        let api = Arc::new(MemoryResourceApi::new());
        let (controller, _informer) = build(api);
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        let result = controller.run(2, stop_rx).await;
        assert!(matches!(result, Err(ControllerError::CacheSyncFailed)));
    }

    #[tokio::test]
    async fn test_run_reconciles_and_shuts_down() {
        let api = Arc::new(MemoryResourceApi::with_service_ip_allocation(
            Ipv4Addr::new(10, 0, 0, 10),
        ));
        api.insert_network(&key(), network("flat"));
        let (controller, informer) = build(Arc::clone(&api));

        let (stop_tx, stop_rx) = watch::channel(false);
        let informer_task = tokio::spawn(informer.run(stop_rx.clone()));
        let controller_task = tokio::spawn(Arc::clone(&controller).run(2, stop_rx));

        eventually(|| {
            api.network(&key())
                .is_some_and(|n| n.phase() == NetworkPhase::Ready)
        })
        .await;
        assert_eq!(api.network(&key()).unwrap().dns_service_ip(), "10.0.0.10");

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), informer_task)
            .await
            .unwrap()
            .unwrap();
        assert!(controller.queue().is_shutting_down());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_reconcile_per_key() {
        let api = Arc::new(InstrumentedApi::new(MemoryResourceApi::with_service_ip_allocation(
            Ipv4Addr::new(10, 0, 0, 10),
        )));
        api.inner.insert_network(&key(), network("flat"));
        let (controller, informer) = build(Arc::clone(&api));

        let (stop_tx, stop_rx) = watch::channel(false);
        let sync = tokio::spawn(informer.run(stop_rx.clone()));
        let run = tokio::spawn(Arc::clone(&controller).run(4, stop_rx));

        for _ in 0..50 {
            controller.queue().add(key().encode());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        eventually(|| {
            api.inner
                .network(&key())
                .is_some_and(|n| n.phase() == NetworkPhase::Ready)
        })
        .await;
        eventually(|| controller.queue().is_empty()).await;

        stop_tx.send(true).unwrap();
        run.await.unwrap().unwrap();
        sync.await.unwrap();
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(api.inner.status_writes().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_is_restarted_after_panic() {
        let api = Arc::new(InstrumentedApi::new(MemoryResourceApi::with_service_ip_allocation(
            Ipv4Addr::new(10, 0, 0, 10),
        )));
        api.panic_once.store(true, Ordering::SeqCst);
        api.inner.insert_network(&key(), network("flat"));
        let (controller, informer) = build(Arc::clone(&api));

        let (stop_tx, stop_rx) = watch::channel(false);
        let sync = tokio::spawn(informer.run(stop_rx.clone()));
        let run = tokio::spawn(Arc::clone(&controller).run(1, stop_rx));

        // The informer's add reaches the only worker, which panics
        eventually(|| !api.panic_once.load(Ordering::SeqCst)).await;

        // A restarted worker must pick this up
        controller.queue().add(key().encode());
        eventually(|| {
            api.inner
                .network(&key())
                .is_some_and(|n| n.phase() == NetworkPhase::Ready)
        })
        .await;

        stop_tx.send(true).unwrap();
        run.await.unwrap().unwrap();
        sync.await.unwrap();
    }
}
