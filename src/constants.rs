// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the tenant Network controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group of the `Network` CRD
pub const API_GROUP: &str = "arktos.futurewei.com";

/// API version of the `Network` CRD
pub const API_VERSION: &str = "v1";

/// Kind name for `Network` resource
pub const KIND_NETWORK: &str = "Network";

/// Field manager / event source component name
pub const CONTROLLER_NAME: &str = "network-controller";

// ============================================================================
// Tenant Layout
// ============================================================================

/// Reserved namespace inside every tenant that holds platform add-ons
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Namespace used for events about cluster-scoped `Network` objects
pub const EVENT_NAMESPACE: &str = "default";

/// Tenant assumed for objects whose metadata carries no tenant
pub const DEFAULT_TENANT: &str = "system";

// ============================================================================
// Network Types
// ============================================================================

/// Network type whose DNS service IP is assigned synchronously by the internal allocator
pub const NETWORK_TYPE_FLAT: &str = "flat";

// ============================================================================
// DNS Resource Names
// ============================================================================

/// Prefix of the per-network DNS `Service` (`kube-dns-{network}`)
pub const DNS_SERVICE_PREFIX: &str = "kube-dns";

/// Base name of the shared CoreDNS `ServiceAccount`
pub const COREDNS_SERVICE_ACCOUNT_BASE: &str = "coredns";

/// Name of the shared CoreDNS `ClusterRole` (never salted)
pub const COREDNS_CLUSTER_ROLE: &str = "system:coredns";

/// Base name of the shared CoreDNS `ClusterRoleBinding`
pub const COREDNS_CLUSTER_ROLE_BINDING_BASE: &str = "system:coredns";

/// Prefix of the per-network `ConfigMap` and `Deployment` (`coredns-{network}`)
pub const COREDNS_CONFIG_PREFIX: &str = "coredns";

/// Container name inside the DNS `Deployment`
pub const CONTAINER_NAME_COREDNS: &str = "coredns";

/// Default CoreDNS image
pub const DEFAULT_COREDNS_IMAGE: &str = "coredns/coredns:1.8.0";

/// Replica count of each per-network DNS `Deployment`
pub const COREDNS_REPLICAS: i32 = 2;

// ============================================================================
// CoreDNS Configuration
// ============================================================================

/// Key of the resolver configuration inside the `ConfigMap`
pub const COREFILE_KEY: &str = "Corefile";

/// Directory the `ConfigMap` is mounted at inside the DNS container
pub const COREFILE_MOUNT_PATH: &str = "/etc/coredns";

/// Full path of the resolver configuration inside the DNS container
pub const COREFILE_PATH: &str = "/etc/coredns/Corefile";

/// Volume name for the mounted `ConfigMap`
pub const VOLUME_CONFIG: &str = "config-volume";

/// Resolver cache TTL in seconds
pub const COREDNS_CACHE_SECS: u32 = 30;

/// Upstream resolver file on the node
pub const UPSTREAM_RESOLV_CONF: &str = "/etc/resolv.conf";

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Standard DNS port for queries
pub const DNS_PORT: u16 = 53;

/// CoreDNS Prometheus metrics port
pub const METRICS_PORT: u16 = 9153;

/// CoreDNS `health` plugin port (serves `/health`)
pub const HEALTH_PORT: u16 = 8080;

/// CoreDNS `ready` plugin port (serves `/ready`)
pub const READY_PORT: u16 = 8181;

/// Liveness probe path
pub const HEALTH_PATH: &str = "/health";

/// Readiness probe path
pub const READY_PATH: &str = "/ready";

// ============================================================================
// Kubernetes Health Check Constants
// ============================================================================

/// Liveness probe initial delay
pub const LIVENESS_INITIAL_DELAY_SECS: i32 = 60;

/// Liveness probe timeout
pub const LIVENESS_TIMEOUT_SECS: i32 = 5;

/// Liveness probe success threshold
pub const LIVENESS_SUCCESS_THRESHOLD: i32 = 1;

/// Liveness probe failure threshold
pub const LIVENESS_FAILURE_THRESHOLD: i32 = 5;

// ============================================================================
// Configuration Defaults
// ============================================================================

/// Default cluster DNS domain
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Default API server port injected into the DNS pods
pub const DEFAULT_APISERVER_PORT: u16 = 6443;

/// Default number of concurrent reconcile workers
pub const DEFAULT_CONCURRENT_WORKERS: usize = 4;

// ============================================================================
// Work Queue Constants
// ============================================================================

/// Base delay for per-key exponential retry backoff (milliseconds)
pub const RETRY_BASE_DELAY_MILLIS: u64 = 5;

/// Maximum delay for per-key exponential retry backoff (seconds)
pub const RETRY_MAX_DELAY_SECS: u64 = 1000;

/// Delay before a Pending network's DNS service IP is checked again
pub const PENDING_RECHECK_SECS: u64 = 5;

/// Minimum interval between restarts of a panicked worker
pub const WORKER_RESTART_PERIOD_SECS: u64 = 1;

// ============================================================================
// Informer Constants
// ============================================================================

/// Delay before re-listing after a failed list or broken watch
pub const RELIST_BACKOFF_SECS: u64 = 2;

/// Server-side timeout for a single watch request
pub const WATCH_TIMEOUT_SECS: u32 = 290;

// ============================================================================
// Event Reasons
// ============================================================================

/// Event reason emitted after a successful reconcile
pub const REASON_SUCCESSFUL_PROVISION: &str = "SuccessfulProvision";

/// Event reason emitted after a failed reconcile
pub const REASON_FAILED_PROVISION: &str = "FailedProvision";

// ============================================================================
// Status Messages
// ============================================================================

/// Status message written when the DNS service has an IP
pub const MESSAGE_READY: &str = "DNS service ready; network ready";

/// Status message written while waiting for the external allocator
pub const MESSAGE_WAITING_FOR_DNS_IP: &str = "waiting for DNS service IP to be allocated";
