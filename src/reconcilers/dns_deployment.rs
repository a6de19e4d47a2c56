// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provisioning of a network's CoreDNS deployment and DNS Service.
//!
//! [`deploy_dns`] ensures the dependency chain in a fixed order:
//!
//! 1. `ServiceAccount` (shared per tenant)
//! 2. `ClusterRole` (shared per tenant)
//! 3. `ClusterRoleBinding` (shared, references 1 and 2)
//! 4. `ConfigMap` with the rendered `Corefile`
//! 5. `Deployment` (references 1 and 4)
//!
//! It stops at the first failure. Every step is idempotent, so the next
//! reconcile picks up at the first missing resource.

use super::ensure::ensure_resource;
use crate::api::{ResourceApi, Scope};
use crate::constants::SYSTEM_NAMESPACE;
use crate::dns_resources::{
    build_cluster_role, build_cluster_role_binding, build_configmap, build_deployment,
    build_service, build_service_account, DnsSettings,
};
use crate::errors::ReconcileError;
use crate::key::NetworkKey;
use k8s_openapi::api::core::v1::Service;
use tracing::debug;

/// Ensure the network's DNS `Service` exists and return it as stored.
///
/// # Errors
///
/// Returns [`ReconcileError::Api`] if the Service can neither be read nor created.
pub async fn create_or_get_dns_service<A: ResourceApi>(
    api: &A,
    key: &NetworkKey,
) -> Result<Service, ReconcileError> {
    let scope = Scope::namespaced(&key.tenant, SYSTEM_NAMESPACE);
    ensure_resource(api, &scope, &build_service(&key.name))
        .await
        .map_err(|e| ReconcileError::api(key, e))
}

/// Ensure the CoreDNS dependencies of one network, in dependency order.
///
/// The shared `ServiceAccount` and RBAC objects are created in the network's
/// tenant; the first network of a tenant creates them and later ones find
/// them in place.
///
/// # Errors
///
/// Returns [`ReconcileError::Api`] for the first failed step, or
/// [`ReconcileError::Render`] if the `Corefile` cannot be rendered.
pub async fn deploy_dns<A: ResourceApi>(
    api: &A,
    settings: &DnsSettings,
    key: &NetworkKey,
) -> Result<(), ReconcileError> {
    let system = Scope::namespaced(&key.tenant, SYSTEM_NAMESPACE);
    let cluster = Scope::cluster(&key.tenant);
    let api_err = |e| ReconcileError::api(key, e);

    debug!(tenant = %key.tenant, name = %key.name, "Deploying network DNS");

    ensure_resource(api, &system, &build_service_account(settings))
        .await
        .map_err(api_err)?;
    ensure_resource(api, &cluster, &build_cluster_role())
        .await
        .map_err(api_err)?;
    ensure_resource(api, &cluster, &build_cluster_role_binding(settings))
        .await
        .map_err(api_err)?;

    let configmap =
        build_configmap(&key.name, settings).map_err(|source| ReconcileError::Render {
            key: key.clone(),
            source,
        })?;
    ensure_resource(api, &system, &configmap)
        .await
        .map_err(api_err)?;

    ensure_resource(api, &system, &build_deployment(&key.name, settings))
        .await
        .map_err(api_err)?;

    debug!(tenant = %key.tenant, name = %key.name, "Network DNS deployed");
    Ok(())
}

#[cfg(test)]
#[path = "dns_deployment_tests.rs"]
mod dns_deployment_tests;
