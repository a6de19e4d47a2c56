// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for tenant networks.
//!
//! A [`Network`] is declared by a tenant and reconciled into a dedicated CoreDNS
//! deployment. It is cluster scoped within its tenant: namespaces do not apply,
//! and the tenant itself travels next to the object as a [`crate::key::NetworkKey`].
//!
//! # Example
//!
//! ```rust,no_run
//! use tenant_network_controller::crd::{Network, NetworkSpec};
//!
//! let network = Network::new(
//!     "blue",
//!     NetworkSpec {
//!         type_: "flat".to_string(),
//!         ..Default::default()
//!     },
//! );
//! assert!(network.is_flat());
//! ```

use crate::constants::NETWORK_TYPE_FLAT;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired state of a tenant network.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "arktos.futurewei.com",
    version = "v1",
    kind = "Network",
    derive = "PartialEq",
    doc = "Network declares a tenant network plane. Each Network gets its own CoreDNS deployment and DNS Service inside the tenant's kube-system namespace."
)]
#[kube(status = "NetworkStatus")]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Network type. `flat` networks get their DNS service IP from the internal
    /// allocator; any other value, or none at all, is backed by an external allocator.
    #[serde(rename = "type", default)]
    pub type_: String,

    /// VPC identifier, interpreted only by the network provider.
    #[serde(rename = "vpcID", default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    /// Service address management settings, interpreted only by the network provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<NetworkServiceSpec>,
}

/// Opaque service IPAM settings of a network.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkServiceSpec {
    /// IPAM mode, e.g. `Arktos` or `External`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<String>,
}

/// Observed state of a tenant network.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Coarse lifecycle phase.
    #[serde(default)]
    pub phase: NetworkPhase,

    /// Human-readable note about the last transition.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Cluster IP of the network's DNS Service. Never cleared once set.
    #[serde(rename = "dnsServiceIP", default, skip_serializing_if = "String::is_empty")]
    pub dns_service_ip: String,
}

/// Lifecycle phase of a [`Network`].
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum NetworkPhase {
    /// Not yet reconciled.
    #[default]
    #[serde(rename = "")]
    Unset,
    /// Dependencies created, DNS service IP not yet known.
    Pending,
    /// DNS service IP known; the network is usable.
    Ready,
    /// Deletion requested; the controller takes no further action.
    Terminating,
    /// A phase this controller does not write. Reconciled like `Unset`.
    #[serde(other)]
    Unknown,
}

impl NetworkPhase {
    /// Wire representation of the phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Terminating => "Terminating",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for NetworkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Network {
    /// Whether this network's DNS service IP comes from the internal allocator.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.spec.type_ == NETWORK_TYPE_FLAT
    }

    /// Whether the deletion marker is set.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Effective phase, with `Terminating` implied by the deletion marker.
    #[must_use]
    pub fn phase(&self) -> NetworkPhase {
        if self.is_terminating() {
            return NetworkPhase::Terminating;
        }
        self.status.as_ref().map_or(NetworkPhase::Unset, |s| s.phase)
    }

    /// Recorded DNS service IP, empty when not yet allocated.
    #[must_use]
    pub fn dns_service_ip(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |s| s.dns_service_ip.as_str())
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
