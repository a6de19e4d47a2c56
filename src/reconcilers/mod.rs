// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for tenant Networks.
//!
//! # Layers
//!
//! - [`ensure`] - idempotent get-then-create of a single dependent resource
//! - [`dns_deployment`] - ordered provisioning of a network's CoreDNS
//!   dependencies and its DNS Service
//! - [`network`] - the Network status state machine and event emission
//!
//! Nothing in this module retries. Errors are returned to the worker loop in
//! [`crate::controller`], which re-queues with backoff.

pub mod dns_deployment;
pub mod ensure;
pub mod network;

pub use dns_deployment::{create_or_get_dns_service, deploy_dns};
pub use ensure::ensure_resource;
pub use network::{reconcile_network, ReconcileOutcome};
