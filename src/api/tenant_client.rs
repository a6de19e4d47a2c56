// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `kube::Client` backed implementation of the tenant-scoped resource API.
//!
//! `kube::Api` cannot address tenants, so requests are built with
//! [`kube::core::Request`] against paths from [`tenant_url_path`] and sent
//! through [`Client::request`]. Failures are classified with
//! [`ApiError::from_kube`].

use super::{
    tenant_url_path, ManagedResource, NetworkEvent, NetworkEventStream, NetworkSnapshot,
    NetworkSource, ProvisionEvent, ResourceApi, Scope, TenantNetwork,
};
use crate::constants::{CONTROLLER_NAME, EVENT_NAMESPACE, KIND_NETWORK, WATCH_TIMEOUT_SECS};
use crate::crd::Network;
use crate::errors::ApiError;
use crate::key::NetworkKey;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::api::{GetParams, ListParams, PostParams, WatchParams};
use kube::core::{Request, WatchEvent};
use kube::{Client, Resource};
use serde_json::json;
use tracing::{debug, trace, warn};

/// Tenant-aware resource API over a `kube::Client`.
#[derive(Clone)]
pub struct TenantClient {
    client: Client,
}

impl TenantClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Collection path of Networks across every tenant.
    fn all_networks_path() -> String {
        format!(
            "/apis/{}/{}/{}",
            Network::group(&()),
            Network::version(&()),
            Network::plural(&())
        )
    }
}

fn request_error(err: kube::core::request::Error) -> ApiError {
    ApiError::Transient(format!("failed to build request: {err}"))
}

fn encode_error(err: serde_json::Error) -> ApiError {
    ApiError::Transient(format!("failed to encode request body: {err}"))
}

/// Decode one listed or watched Network, logging and dropping it if malformed.
fn decode_network(value: serde_json::Value) -> Option<TenantNetwork> {
    let tenant = value
        .pointer("/metadata/tenant")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let name = value
        .pointer("/metadata/name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    match TenantNetwork::from_value(value) {
        Ok(network) => Some(network),
        Err(e) => {
            warn!(tenant = %tenant, name = %name, error = %e, "Skipping undecodable network");
            None
        }
    }
}

/// Body of a `core/v1` Event about a tenant Network.
fn event_body(event: &ProvisionEvent) -> serde_json::Value {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    json!({
        "apiVersion": "v1",
        "kind": "Event",
        "metadata": {
            "generateName": format!("{}.", event.key.name),
            "namespace": EVENT_NAMESPACE,
            "tenant": event.key.tenant,
        },
        "involvedObject": {
            "apiVersion": Network::api_version(&()),
            "kind": KIND_NETWORK,
            "name": event.key.name,
            "tenant": event.key.tenant,
            "uid": event.uid,
        },
        "type": event.event_type.as_str(),
        "reason": event.reason,
        "message": event.message,
        "source": { "component": CONTROLLER_NAME },
        "reportingComponent": CONTROLLER_NAME,
        "firstTimestamp": now,
        "lastTimestamp": now,
        "count": 1,
    })
}

#[async_trait]
impl ResourceApi for TenantClient {
    async fn get<K: ManagedResource>(&self, scope: &Scope, name: &str) -> Result<K, ApiError> {
        let kind = K::kind(&());
        let request = Request::new(tenant_url_path::<K>(scope))
            .get(name, &GetParams::default())
            .map_err(request_error)?;
        trace!(scope = %scope, kind = %kind, name = %name, "GET");
        self.client
            .request::<K>(request)
            .await
            .map_err(|e| ApiError::from_kube(e, &kind, name))
    }

    async fn create<K: ManagedResource>(&self, scope: &Scope, object: &K) -> Result<K, ApiError> {
        let kind = K::kind(&());
        let name = object.meta().name.clone().unwrap_or_default();
        let data = serde_json::to_vec(object).map_err(encode_error)?;
        let request = Request::new(tenant_url_path::<K>(scope))
            .create(&PostParams::default(), data)
            .map_err(request_error)?;
        debug!(scope = %scope, kind = %kind, name = %name, "POST");
        self.client
            .request::<K>(request)
            .await
            .map_err(|e| ApiError::from_kube(e, &kind, &name))
    }

    async fn update_network_status(
        &self,
        key: &NetworkKey,
        network: &Network,
    ) -> Result<Network, ApiError> {
        let data = serde_json::to_vec(network).map_err(encode_error)?;
        let request = Request::new(tenant_url_path::<Network>(&Scope::cluster(&key.tenant)))
            .replace_subresource("status", &key.name, &PostParams::default(), data)
            .map_err(request_error)?;
        debug!(tenant = %key.tenant, name = %key.name, "PUT status");
        self.client
            .request::<Network>(request)
            .await
            .map_err(|e| ApiError::from_kube(e, KIND_NETWORK, &key.name))
    }

    async fn publish_event(&self, event: &ProvisionEvent) -> Result<(), ApiError> {
        let scope = Scope::namespaced(&event.key.tenant, EVENT_NAMESPACE);
        let data = serde_json::to_vec(&event_body(event)).map_err(encode_error)?;
        let request = Request::new(tenant_url_path::<Event>(&scope))
            .create(&PostParams::default(), data)
            .map_err(request_error)?;
        self.client
            .request::<serde_json::Value>(request)
            .await
            .map(|_| ())
            .map_err(|e| ApiError::from_kube(e, "Event", &event.key.name))
    }
}

#[async_trait]
impl NetworkSource for TenantClient {
    async fn list_networks(&self) -> Result<NetworkSnapshot, ApiError> {
        let request = Request::new(Self::all_networks_path())
            .list(&ListParams::default())
            .map_err(request_error)?;
        let list = self
            .client
            .request::<serde_json::Value>(request)
            .await
            .map_err(|e| ApiError::from_kube(e, KIND_NETWORK, ""))?;

        let resource_version = list
            .pointer("/metadata/resourceVersion")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let items = match list.get("items") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .cloned()
                .filter_map(decode_network)
                .collect(),
            _ => Vec::new(),
        };

        debug!(count = items.len(), resource_version = %resource_version, "Listed networks");
        Ok(NetworkSnapshot {
            items,
            resource_version,
        })
    }

    async fn watch_networks(&self, resource_version: &str) -> Result<NetworkEventStream, ApiError> {
        let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        let request = Request::new(Self::all_networks_path())
            .watch(&params, resource_version)
            .map_err(request_error)?;
        let events = self
            .client
            .request_events::<serde_json::Value>(request)
            .await
            .map_err(|e| ApiError::from_kube(e, KIND_NETWORK, ""))?;

        Ok(events
            .filter_map(|event| {
                let mapped = match event {
                    Ok(WatchEvent::Added(value) | WatchEvent::Modified(value)) => {
                        decode_network(value).map(|n| Ok(NetworkEvent::Applied(n)))
                    }
                    Ok(WatchEvent::Deleted(value)) => {
                        decode_network(value).map(|n| Ok(NetworkEvent::Deleted(n)))
                    }
                    Ok(WatchEvent::Bookmark(bookmark)) => Some(Ok(NetworkEvent::Bookmark(
                        bookmark.metadata.resource_version,
                    ))),
                    Ok(WatchEvent::Error(status)) => Some(Err(ApiError::Transient(format!(
                        "watch error: {status:?}"
                    )))),
                    Err(e) => Some(Err(ApiError::Transient(e.to_string()))),
                };
                futures::future::ready(mapped)
            })
            .boxed())
    }
}

#[cfg(test)]
#[path = "tenant_client_tests.rs"]
mod tenant_client_tests;
