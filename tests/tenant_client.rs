// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP-level tests of the kube-backed tenant client against a mock API server.
//!
//! Run with: cargo test --test tenant_client

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::rbac::v1::ClusterRole;
use kube::Client;
use serde_json::{json, Value};
use tenant_network_controller::api::tenant_client::TenantClient;
use futures::StreamExt;
use tenant_network_controller::api::{
    EventType, NetworkEvent, NetworkSource, ProvisionEvent, ResourceApi, Scope,
};
use tenant_network_controller::crd::{Network, NetworkPhase, NetworkSpec, NetworkStatus};
use tenant_network_controller::dns_resources::{build_cluster_role, build_service};
use tenant_network_controller::errors::ApiError;
use tenant_network_controller::key::NetworkKey;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

async fn client_for(server: &MockServer) -> TenantClient {
    let uri: http::Uri = server.uri().parse().unwrap();
    let client = Client::try_from(kube::Config::new(uri)).unwrap();
    TenantClient::new(client)
}

fn status_body(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    })
}

fn network_body(tenant: &str, name: &str, rv: &str, status: Value) -> Value {
    json!({
        "apiVersion": "arktos.futurewei.com/v1",
        "kind": "Network",
        "metadata": {
            "name": name,
            "tenant": tenant,
            "resourceVersion": rv,
            "uid": format!("uid-{name}"),
        },
        "spec": { "type": "flat" },
        "status": status,
    })
}

fn system() -> Scope {
    Scope::namespaced("t1", "kube-system")
}

// ============================================================================
// ResourceApi
// ============================================================================

#[tokio::test]
async fn get_missing_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/tenants/t1/namespaces/kube-system/services/kube-dns-n1",
        ))
        .respond_with(ResponseTemplate::new(404).set_body_json(status_body(
            404,
            "NotFound",
            "services \"kube-dns-n1\" not found",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let err = api.get::<Service>(&system(), "kube-dns-n1").await.unwrap_err();
    assert_eq!(err, ApiError::not_found("Service", "kube-dns-n1"));
}

#[tokio::test]
async fn create_posts_to_tenant_path() {
    let server = MockServer::start().await;
    let mut stored = serde_json::to_value(build_service("n1")).unwrap();
    stored["spec"]["clusterIP"] = json!("10.0.0.10");
    Mock::given(method("POST"))
        .and(path("/api/v1/tenants/t1/namespaces/kube-system/services"))
        .and(body_partial_json(json!({ "metadata": { "name": "kube-dns-n1" } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let created = api.create(&system(), &build_service("n1")).await.unwrap();
    assert_eq!(
        created.spec.and_then(|s| s.cluster_ip).as_deref(),
        Some("10.0.0.10")
    );
}

#[tokio::test]
async fn create_conflicts_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/apis/rbac.authorization.k8s.io/v1/tenants/t1/clusterroles",
        ))
        .respond_with(ResponseTemplate::new(409).set_body_json(status_body(
            409,
            "AlreadyExists",
            "clusterroles \"system:coredns\" already exists",
        )))
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let err = api
        .create::<ClusterRole>(&Scope::cluster("t1"), &build_cluster_role())
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/api/v1/tenants/t1/namespaces/kube-system/services/kube-dns-n1",
        ))
        .respond_with(ResponseTemplate::new(503).set_body_json(status_body(
            503,
            "ServiceUnavailable",
            "etcd unavailable",
        )))
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let err = api.get::<Service>(&system(), "kube-dns-n1").await.unwrap_err();
    assert!(matches!(err, ApiError::Transient(_)));
}

#[tokio::test]
async fn status_update_uses_status_subresource() {
    let server = MockServer::start().await;
    let ready = json!({
        "phase": "Ready",
        "dnsServiceIP": "10.0.0.10",
        "message": "DNS service ready; network ready",
    });
    Mock::given(method("PUT"))
        .and(path(
            "/apis/arktos.futurewei.com/v1/tenants/t1/networks/n1/status",
        ))
        .and(body_partial_json(json!({
            "metadata": { "resourceVersion": "7" },
            "status": ready,
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(network_body("t1", "n1", "8", ready.clone())),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut network = Network::new(
        "n1",
        NetworkSpec {
            type_: "flat".into(),
            ..Default::default()
        },
    );
    network.metadata.resource_version = Some("7".into());
    network.status = Some(NetworkStatus {
        phase: NetworkPhase::Ready,
        message: "DNS service ready; network ready".into(),
        dns_service_ip: "10.0.0.10".into(),
    });

    let api = client_for(&server).await;
    let updated = api
        .update_network_status(&NetworkKey::new("t1", "n1"), &network)
        .await
        .unwrap();
    assert_eq!(updated.phase(), NetworkPhase::Ready);
    assert_eq!(updated.metadata.resource_version.as_deref(), Some("8"));
}

#[tokio::test]
async fn stale_status_update_is_a_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(
            "/apis/arktos.futurewei.com/v1/tenants/t1/networks/n1/status",
        ))
        .respond_with(ResponseTemplate::new(409).set_body_json(status_body(
            409,
            "Conflict",
            "the object has been modified",
        )))
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let network = Network::new("n1", NetworkSpec::default());
    let err = api
        .update_network_status(&NetworkKey::new("t1", "n1"), &network)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict { .. }));
}

#[tokio::test]
async fn events_are_posted_to_the_tenant_default_namespace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/tenants/t1/namespaces/default/events"))
        .and(body_partial_json(json!({
            "type": "Normal",
            "reason": "SuccessfulProvision",
            "involvedObject": { "kind": "Network", "name": "n1" },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": { "name": "n1.abc", "namespace": "default" },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let event = ProvisionEvent {
        key: NetworkKey::new("t1", "n1"),
        uid: Some("uid-n1".into()),
        event_type: EventType::Normal,
        reason: "SuccessfulProvision".into(),
        message: "Network n1 in tenant t1: DNS service ready; network ready".into(),
    };
    api.publish_event(&event).await.unwrap();
}

// ============================================================================
// NetworkSource
// ============================================================================

#[tokio::test]
async fn list_spans_all_tenants() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/arktos.futurewei.com/v1/networks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "arktos.futurewei.com/v1",
            "kind": "NetworkList",
            "metadata": { "resourceVersion": "42" },
            "items": [
                network_body("t1", "blue", "40", json!({})),
                network_body("t2", "green", "41", json!({ "phase": "Pending" })),
            ],
        })))
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let snapshot = api.list_networks().await.unwrap();
    assert_eq!(snapshot.resource_version, "42");

    let keys: Vec<NetworkKey> = snapshot.items.iter().map(|i| i.key.clone()).collect();
    assert_eq!(
        keys,
        vec![NetworkKey::new("t1", "blue"), NetworkKey::new("t2", "green")]
    );
    assert_eq!(snapshot.items[1].network.phase(), NetworkPhase::Pending);
}

#[tokio::test]
async fn list_skips_undecodable_networks() {
    let server = MockServer::start().await;
    let mut broken = network_body("t1", "broken", "39", json!({}));
    broken["spec"] = json!("nonsense");
    let mut untyped = network_body("t2", "legacy", "41", json!({ "phase": "Failed" }));
    untyped["spec"] = json!({});
    Mock::given(method("GET"))
        .and(path("/apis/arktos.futurewei.com/v1/networks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "arktos.futurewei.com/v1",
            "kind": "NetworkList",
            "metadata": { "resourceVersion": "42" },
            "items": [
                broken,
                network_body("t1", "blue", "40", json!({})),
                untyped,
            ],
        })))
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let snapshot = api.list_networks().await.unwrap();
    assert_eq!(snapshot.resource_version, "42");

    let keys: Vec<NetworkKey> = snapshot.items.iter().map(|i| i.key.clone()).collect();
    assert_eq!(
        keys,
        vec![NetworkKey::new("t1", "blue"), NetworkKey::new("t2", "legacy")]
    );
    let legacy = &snapshot.items[1].network;
    assert!(!legacy.is_flat());
    assert_eq!(legacy.phase(), NetworkPhase::Unknown);
}

#[tokio::test]
async fn watch_skips_undecodable_networks() {
    let server = MockServer::start().await;
    let mut broken = network_body("t1", "broken", "43", json!({}));
    broken["spec"] = json!("nonsense");
    let lines = [
        json!({ "type": "ADDED", "object": broken }),
        json!({ "type": "MODIFIED", "object": network_body("t1", "blue", "44", json!({})) }),
    ]
    .iter()
    .map(|line| format!("{line}\n"))
    .collect::<String>();
    Mock::given(method("GET"))
        .and(path("/apis/arktos.futurewei.com/v1/networks"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(lines),
        )
        .mount(&server)
        .await;

    let api = client_for(&server).await;
    let events: Vec<NetworkEvent> = api
        .watch_networks("42")
        .await
        .unwrap()
        .map(|event| event.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    let NetworkEvent::Applied(applied) = &events[0] else {
        panic!("expected an applied event, got {:?}", events[0]);
    };
    assert_eq!(applied.key, NetworkKey::new("t1", "blue"));
    assert_eq!(applied.resource_version(), Some("44"));
}
