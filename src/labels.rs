// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label constants used on every DNS resource the controller creates.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

// ============================================================================
// Add-on Labels
// ============================================================================

/// Legacy add-on selector label used by kube-dns compatible Services
pub const K8S_APP: &str = "k8s-app";

/// Marks a resource as managed by the add-on manager reconcile loop
pub const ADDON_MODE: &str = "addonmanager.kubernetes.io/mode";

/// Add-on manager mode: reconcile
pub const ADDON_MODE_RECONCILE: &str = "Reconcile";

/// Add-on manager mode: create if missing, never overwrite edits
pub const ADDON_MODE_ENSURE_EXISTS: &str = "EnsureExists";

/// Marks a Service as part of the cluster DNS add-on
pub const CLUSTER_SERVICE: &str = "kubernetes.io/cluster-service";

/// Identifies the RBAC objects of the default cluster roles
pub const RBAC_BOOTSTRAPPING: &str = "kubernetes.io/bootstrapping";

// ============================================================================
// Label Values
// ============================================================================

/// Application name for the DNS server
pub const APP_NAME_COREDNS: &str = "coredns";

/// Component value for DNS server resources
pub const COMPONENT_DNS_SERVER: &str = "dns-server";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_NETWORK_CONTROLLER: &str = "network-controller";

/// Value of `kubernetes.io/bootstrapping` on RBAC defaults
pub const RBAC_DEFAULTS: &str = "rbac-defaults";

// ============================================================================
// Network Labels
// ============================================================================

/// Label naming the `Network` a DNS resource belongs to
pub const NETWORK_LABEL: &str = "arktos.futurewei.com/network";
