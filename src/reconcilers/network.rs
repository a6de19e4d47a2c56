// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Network reconciler.
//!
//! Drives a [`Network`] through its status lifecycle:
//!
//! ```text
//!   "" ----> Pending ----> Ready
//!    |                       ^
//!    +-----------------------+
//!
//!   any phase + deletion marker --> Terminating (no further action)
//! ```
//!
//! A Network that already records an IP is moved to `Ready` without touching
//! its dependencies, whatever its type.
//!
//! **Flat** networks get their DNS Service IP from the internal allocator, so
//! the reconciler provisions everything and moves straight to `Ready` in one
//! status write once the IP is visible.
//!
//! **Non-flat** networks may wait on an external allocator. The reconciler
//! provisions everything, then records `Ready` if the Service already has an
//! IP, or `Pending` otherwise.
//!
//! The recorded IP is never cleared and `Ready` never goes back to `Pending`.

use super::dns_deployment::{create_or_get_dns_service, deploy_dns};
use crate::api::{EventType, ProvisionEvent, ResourceApi};
use crate::constants::{
    MESSAGE_READY, MESSAGE_WAITING_FOR_DNS_IP, REASON_FAILED_PROVISION,
    REASON_SUCCESSFUL_PROVISION,
};
use crate::crd::{Network, NetworkPhase, NetworkStatus};
use crate::dns_resources::{dns_service_name, DnsSettings};
use crate::errors::ReconcileError;
use crate::key::NetworkKey;
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info, warn};

/// What a successful reconcile left the Network at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Network is `Ready`. `updated` is true if this pass wrote the status.
    Ready { updated: bool },
    /// The DNS Service has no IP yet. `updated` is true if this pass wrote the status.
    Pending { updated: bool },
    /// The deletion marker is set; nothing was done.
    Terminating,
}

impl ReconcileOutcome {
    /// Whether this pass changed the Network's status.
    #[must_use]
    pub fn status_updated(&self) -> bool {
        match self {
            Self::Ready { updated } | Self::Pending { updated } => *updated,
            Self::Terminating => false,
        }
    }
}

fn service_cluster_ip(service: &Service) -> &str {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.cluster_ip.as_deref())
        .unwrap_or_default()
}

/// Reconcile one Network read from the informer cache.
///
/// Emits a `SuccessfulProvision` event after every successful pass, whether or
/// not it wrote the status, and a `FailedProvision` warning when it fails.
/// Terminating networks are left alone: no writes and no events.
///
/// # Arguments
///
/// * `api` - Tenant-scoped resource API
/// * `settings` - Process-wide DNS settings
/// * `key` - Tenant and name of the Network
/// * `network` - The Network as currently cached
///
/// # Errors
///
/// Returns [`ReconcileError`] for any failed API call or render; the caller
/// re-queues the key with backoff.
pub async fn reconcile_network<A: ResourceApi>(
    api: &A,
    settings: &DnsSettings,
    key: &NetworkKey,
    network: &Network,
) -> Result<ReconcileOutcome, ReconcileError> {
    if network.is_terminating() {
        debug!(tenant = %key.tenant, name = %key.name, "Network is terminating, skipping");
        return Ok(ReconcileOutcome::Terminating);
    }

    debug!(
        tenant = %key.tenant,
        name = %key.name,
        network_type = %network.spec.type_,
        phase = %network.phase(),
        "Reconciling network"
    );

    let result = provision(api, settings, key, network).await;

    match &result {
        Ok(outcome) => {
            let message = match outcome {
                ReconcileOutcome::Pending { .. } => MESSAGE_WAITING_FOR_DNS_IP,
                _ => MESSAGE_READY,
            };
            publish(
                api,
                network,
                key,
                EventType::Normal,
                REASON_SUCCESSFUL_PROVISION,
                format!("Network {} in tenant {}: {message}", key.name, key.tenant),
            )
            .await;
        }
        Err(e) => {
            warn!(tenant = %key.tenant, name = %key.name, error = %e, "Network reconcile failed");
            publish(
                api,
                network,
                key,
                EventType::Warning,
                REASON_FAILED_PROVISION,
                e.to_string(),
            )
            .await;
        }
    }

    result
}

async fn provision<A: ResourceApi>(
    api: &A,
    settings: &DnsSettings,
    key: &NetworkKey,
    network: &Network,
) -> Result<ReconcileOutcome, ReconcileError> {
    if let Some(outcome) = adopt_recorded_ip(api, key, network).await? {
        return Ok(outcome);
    }
    if network.is_flat() {
        reconcile_flat(api, settings, key, network).await
    } else {
        reconcile_non_flat(api, settings, key, network).await
    }
}

/// A recorded IP is authoritative: move the Network to `Ready` with it and
/// leave the dependencies alone. `None` if no IP is recorded yet.
async fn adopt_recorded_ip<A: ResourceApi>(
    api: &A,
    key: &NetworkKey,
    network: &Network,
) -> Result<Option<ReconcileOutcome>, ReconcileError> {
    let recorded_ip = network.dns_service_ip();
    if recorded_ip.is_empty() {
        return Ok(None);
    }
    if network.phase() == NetworkPhase::Ready {
        return Ok(Some(ReconcileOutcome::Ready { updated: false }));
    }

    write_status(api, key, network, NetworkPhase::Ready, recorded_ip, MESSAGE_READY).await?;
    info!(tenant = %key.tenant, name = %key.name, dns_service_ip = %recorded_ip, "Network is ready");
    Ok(Some(ReconcileOutcome::Ready { updated: true }))
}

async fn reconcile_flat<A: ResourceApi>(
    api: &A,
    settings: &DnsSettings,
    key: &NetworkKey,
    network: &Network,
) -> Result<ReconcileOutcome, ReconcileError> {
    let service = create_or_get_dns_service(api, key).await?;
    deploy_dns(api, settings, key).await?;

    let ip = service_cluster_ip(&service);
    if ip.is_empty() {
        return Err(ReconcileError::DnsServiceIpNotAllocated {
            key: key.clone(),
            service: dns_service_name(&key.name),
        });
    }

    write_status(api, key, network, NetworkPhase::Ready, ip, MESSAGE_READY).await?;
    info!(tenant = %key.tenant, name = %key.name, dns_service_ip = %ip, "Network is ready");
    Ok(ReconcileOutcome::Ready { updated: true })
}

async fn reconcile_non_flat<A: ResourceApi>(
    api: &A,
    settings: &DnsSettings,
    key: &NetworkKey,
    network: &Network,
) -> Result<ReconcileOutcome, ReconcileError> {
    let service = create_or_get_dns_service(api, key).await?;
    deploy_dns(api, settings, key).await?;

    let ip = service_cluster_ip(&service);
    if !ip.is_empty() {
        write_status(api, key, network, NetworkPhase::Ready, ip, MESSAGE_READY).await?;
        info!(tenant = %key.tenant, name = %key.name, dns_service_ip = %ip, "Network is ready");
        return Ok(ReconcileOutcome::Ready { updated: true });
    }

    // Ready never goes back to Pending
    if matches!(network.phase(), NetworkPhase::Pending | NetworkPhase::Ready) {
        debug!(tenant = %key.tenant, name = %key.name, "Still waiting for DNS service IP");
        return Ok(ReconcileOutcome::Pending { updated: false });
    }

    write_status(
        api,
        key,
        network,
        NetworkPhase::Pending,
        "",
        MESSAGE_WAITING_FOR_DNS_IP,
    )
    .await?;
    info!(tenant = %key.tenant, name = %key.name, "Network is pending DNS service IP");
    Ok(ReconcileOutcome::Pending { updated: true })
}

/// Replace the Network's status. The write carries the cached resourceVersion,
/// so a concurrent change fails with a conflict and the key is retried.
async fn write_status<A: ResourceApi>(
    api: &A,
    key: &NetworkKey,
    network: &Network,
    phase: NetworkPhase,
    dns_service_ip: &str,
    message: &str,
) -> Result<(), ReconcileError> {
    let mut updated = network.clone();
    updated.status = Some(NetworkStatus {
        phase,
        message: message.to_string(),
        dns_service_ip: dns_service_ip.to_string(),
    });
    api.update_network_status(key, &updated)
        .await
        .map(|_| ())
        .map_err(|e| ReconcileError::api(key, e))
}

/// Best-effort event; failures are logged and dropped.
async fn publish<A: ResourceApi>(
    api: &A,
    network: &Network,
    key: &NetworkKey,
    event_type: EventType,
    reason: &str,
    message: String,
) {
    let event = ProvisionEvent {
        key: key.clone(),
        uid: network.metadata.uid.clone(),
        event_type,
        reason: reason.to_string(),
        message,
    };
    if let Err(e) = api.publish_event(&event).await {
        warn!(tenant = %key.tenant, name = %key.name, reason = %reason, error = %e, "Failed to publish event");
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod network_tests;
