// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tenant-scoped resource API.
//!
//! Every object the controller touches lives inside a tenant. The tenant is
//! part of the REST path, not of the object, so the operations here take a
//! [`Scope`] (tenant plus optional namespace) next to the object name.
//!
//! Two implementations exist:
//!
//! - [`tenant_client::TenantClient`] - talks to the API server through a
//!   `kube::Client`, building the tenant paths by hand
//! - [`memory::MemoryResourceApi`] - in-process store used by tests and dry runs

pub mod memory;
pub mod tenant_client;

use crate::constants::DEFAULT_TENANT;
use crate::crd::Network;
use crate::errors::ApiError;
use crate::key::NetworkKey;
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Objects the controller can read and create through [`ResourceApi`].
pub trait ManagedResource:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + fmt::Debug + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + fmt::Debug
        + 'static
{
}

/// Where an object lives: a tenant, and a namespace for namespaced kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    pub tenant: String,
    pub namespace: Option<String>,
}

impl Scope {
    /// Cluster scope within a tenant (ClusterRole, ClusterRoleBinding, Network).
    pub fn cluster(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            namespace: None,
        }
    }

    /// A namespace within a tenant.
    pub fn namespaced(tenant: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{ns}", self.tenant),
            None => f.write_str(&self.tenant),
        }
    }
}

/// Build the REST collection path of `K` inside `scope`.
///
/// The core group uses `/api/{version}`, every other group
/// `/apis/{group}/{version}`; the tenant segment follows, then the optional
/// namespace, then the plural resource name.
#[must_use]
pub fn tenant_url_path<K: Resource<DynamicType = ()>>(scope: &Scope) -> String {
    let group = K::group(&());
    let version = K::version(&());
    let plural = K::plural(&());

    let mut path = if group.is_empty() {
        format!("/api/{version}/tenants/{}", scope.tenant)
    } else {
        format!("/apis/{group}/{version}/tenants/{}", scope.tenant)
    };
    if let Some(ns) = &scope.namespace {
        path.push_str("/namespaces/");
        path.push_str(ns);
    }
    path.push('/');
    path.push_str(&plural);
    path
}

/// Severity of a [`ProvisionEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// An event about a Network, addressed by its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionEvent {
    pub key: NetworkKey,
    pub uid: Option<String>,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

/// Operations the reconciler performs against the cluster.
///
/// All calls classify their failures into [`ApiError`]; callers decide what
/// is retryable.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Read one object.
    async fn get<K: ManagedResource>(&self, scope: &Scope, name: &str) -> Result<K, ApiError>;

    /// Create `object` and return what the server stored.
    async fn create<K: ManagedResource>(&self, scope: &Scope, object: &K) -> Result<K, ApiError>;

    /// Replace the status subresource of a Network.
    ///
    /// `network` must carry the resourceVersion it was read at; a stale
    /// version fails with [`ApiError::Conflict`].
    async fn update_network_status(
        &self,
        key: &NetworkKey,
        network: &Network,
    ) -> Result<Network, ApiError>;

    /// Record an event. Callers treat failures as non-fatal.
    async fn publish_event(&self, event: &ProvisionEvent) -> Result<(), ApiError>;
}

/// A Network together with the tenant it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct TenantNetwork {
    pub key: NetworkKey,
    pub network: Network,
}

impl TenantNetwork {
    /// Decode a Network from its wire form, taking the tenant from
    /// `metadata.tenant`. Objects without a tenant belong to the system tenant.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transient`] if the value is not a valid Network.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ApiError> {
        let tenant = value
            .pointer("/metadata/tenant")
            .and_then(serde_json::Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TENANT)
            .to_string();
        let network: Network = serde_json::from_value(value)
            .map_err(|e| ApiError::Transient(format!("failed to decode Network: {e}")))?;
        let name = network.metadata.name.clone().unwrap_or_default();
        Ok(Self {
            key: NetworkKey::new(tenant, name),
            network,
        })
    }

    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        self.network.metadata.resource_version.as_deref()
    }
}

/// A full listing of Networks across all tenants.
#[derive(Clone, Debug, Default)]
pub struct NetworkSnapshot {
    pub items: Vec<TenantNetwork>,
    /// Version to start watching from.
    pub resource_version: String,
}

/// A change observed on the Network watch.
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkEvent {
    Applied(TenantNetwork),
    Deleted(TenantNetwork),
    /// Progress marker carrying only a resourceVersion.
    Bookmark(String),
}

/// Stream of watch events. Ends (or yields an error) when the watch expires.
pub type NetworkEventStream = BoxStream<'static, Result<NetworkEvent, ApiError>>;

/// List+watch access to Networks across all tenants.
#[async_trait]
pub trait NetworkSource: Send + Sync + 'static {
    async fn list_networks(&self) -> Result<NetworkSnapshot, ApiError>;

    async fn watch_networks(&self, resource_version: &str) -> Result<NetworkEventStream, ApiError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
