// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Tenant Network Controller
//!
//! A Kubernetes controller that gives every tenant `Network` its own CoreDNS
//! deployment and DNS Service, and records the Service's cluster IP in the
//! Network's status.
//!
//! ## Overview
//!
//! Networks are watched across all tenants. Each add or update becomes a
//! `tenant/name` key in a work queue. A pool of workers drains the queue and
//! runs one reconcile per key at a time:
//!
//! 1. Get or create the `kube-dns-{network}` Service in the tenant's
//!    `kube-system` namespace
//! 2. Get or create the shared CoreDNS ServiceAccount, ClusterRole and
//!    ClusterRoleBinding, then the network's ConfigMap and Deployment
//! 3. Write `Ready` with the Service's cluster IP, or `Pending` while an
//!    external allocator has not assigned one yet
//!
//! Failures are retried with per-key exponential backoff.
//!
//! ## Modules
//!
//! - [`crd`] - the `Network` custom resource
//! - [`api`] - tenant-scoped resource API and its in-memory double
//! - [`informer`] - list/watch cache of Networks
//! - [`workqueue`] - deduplicating, rate-limited work queue
//! - [`controller`] - worker pool and lifecycle
//! - [`reconcilers`] - provisioning and the status state machine
//! - [`dns_resources`] - builders for the CoreDNS objects
//! - [`config`] - command-line and environment configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use tenant_network_controller::dns_resources::build_service;
//!
//! let service = build_service("blue");
//! assert_eq!(service.metadata.name.as_deref(), Some("kube-dns-blue"));
//! ```

pub mod api;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod dns_resources;
pub mod errors;
pub mod informer;
pub mod key;
pub mod labels;
pub mod reconcilers;
pub mod workqueue;
