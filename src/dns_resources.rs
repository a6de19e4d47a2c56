// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CoreDNS Kubernetes resource builders
//!
//! This module provides functions to build the Kubernetes resources backing a
//! network's dedicated DNS service (`ServiceAccount`, `ClusterRole`,
//! `ClusterRoleBinding`, `ConfigMap`, `Deployment`, `Service`). All functions are
//! pure and deterministic: the same network name and [`DnsSettings`] always
//! produce identical objects.
//!
//! # Naming
//!
//! With salt `S` and network `N` (`suffix(x, S)` is `x` when `S` is empty,
//! otherwise `x-S`):
//!
//! | Resource | Name | Scope |
//! |----------|------|-------|
//! | `Service` | `kube-dns-{N}` | `kube-system` |
//! | `ServiceAccount` | `suffix(coredns, S)` | `kube-system` |
//! | `ClusterRole` | `system:coredns` | tenant |
//! | `ClusterRoleBinding` | `suffix(system:coredns, S)` | tenant |
//! | `ConfigMap` | `suffix(coredns-{N}, S)` | `kube-system` |
//! | `Deployment` | same as the `ConfigMap` | `kube-system` |

use crate::constants::{
    COREDNS_CACHE_SECS, COREDNS_CLUSTER_ROLE, COREDNS_CLUSTER_ROLE_BINDING_BASE,
    COREDNS_CONFIG_PREFIX, COREDNS_REPLICAS, COREDNS_SERVICE_ACCOUNT_BASE, COREFILE_KEY,
    COREFILE_MOUNT_PATH, COREFILE_PATH, CONTAINER_NAME_COREDNS, DEFAULT_APISERVER_PORT,
    DEFAULT_CLUSTER_DOMAIN, DEFAULT_COREDNS_IMAGE, DNS_PORT, DNS_SERVICE_PREFIX, HEALTH_PATH,
    HEALTH_PORT, LIVENESS_FAILURE_THRESHOLD, LIVENESS_INITIAL_DELAY_SECS,
    LIVENESS_SUCCESS_THRESHOLD, LIVENESS_TIMEOUT_SECS, METRICS_PORT, READY_PATH, READY_PORT,
    SYSTEM_NAMESPACE, UPSTREAM_RESOLV_CONF, VOLUME_CONFIG,
};
use crate::errors::RenderError;
use crate::labels::{
    ADDON_MODE, ADDON_MODE_ENSURE_EXISTS, ADDON_MODE_RECONCILE, APP_NAME_COREDNS,
    CLUSTER_SERVICE, COMPONENT_DNS_SERVER, K8S_APP, K8S_COMPONENT, K8S_INSTANCE,
    K8S_MANAGED_BY, K8S_NAME, MANAGED_BY_NETWORK_CONTROLLER, NETWORK_LABEL, RBAC_BOOTSTRAPPING,
    RBAC_DEFAULTS,
};
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment},
    core::v1::{
        Affinity, Capabilities, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort,
        EnvVar, HTTPGetAction, KeyToPath, PodAffinityTerm, PodAntiAffinity, PodSpec,
        PodTemplateSpec, Probe, ResourceRequirements, SecurityContext, Service,
        ServiceAccount, ServicePort, ServiceSpec, Toleration, Volume, VolumeMount,
        WeightedPodAffinityTerm,
    },
    rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject},
};
use k8s_openapi::apimachinery::pkg::{
    api::resource::Quantity,
    apis::meta::v1::{LabelSelector, LabelSelectorRequirement, ObjectMeta},
    util::intstr::IntOrString,
};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

// Embed the resolver configuration template at compile time
const COREFILE_TEMPLATE: &str = include_str!("../templates/Corefile.tmpl");

const PRIORITY_CLASS_CRITICAL: &str = "system-cluster-critical";
const TOLERATION_CRITICAL_ADDONS: &str = "CriticalAddonsOnly";
const NODE_OS_LABEL: &str = "kubernetes.io/os";
const NODE_OS_LINUX: &str = "linux";
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
const ANTI_AFFINITY_WEIGHT: i32 = 100;
const ENV_APISERVER_HOST: &str = "KUBERNETES_SERVICE_HOST";
const ENV_APISERVER_PORT: &str = "KUBERNETES_SERVICE_PORT";

/// Process-wide parameters shared by every builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsSettings {
    /// Cluster DNS domain served by each CoreDNS instance
    pub cluster_domain: String,
    /// Suffix for the salted resource names (may be empty)
    pub salt: String,
    /// Control-plane endpoint host injected into the DNS pods
    pub apiserver_host: IpAddr,
    /// Control-plane endpoint port injected into the DNS pods
    pub apiserver_port: u16,
    /// CoreDNS container image
    pub image: String,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            salt: String::new(),
            apiserver_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            apiserver_port: DEFAULT_APISERVER_PORT,
            image: DEFAULT_COREDNS_IMAGE.to_string(),
        }
    }
}

// ============================================================================
// Names
// ============================================================================

/// Append `-{salt}` to `base` unless the salt is empty.
#[must_use]
pub fn suffixed(base: &str, salt: &str) -> String {
    if salt.is_empty() {
        base.to_string()
    } else {
        format!("{base}-{salt}")
    }
}

/// Name of the network's DNS `Service`. Never salted.
#[must_use]
pub fn dns_service_name(network: &str) -> String {
    format!("{DNS_SERVICE_PREFIX}-{network}")
}

#[must_use]
pub fn service_account_name(salt: &str) -> String {
    suffixed(COREDNS_SERVICE_ACCOUNT_BASE, salt)
}

#[must_use]
pub fn cluster_role_name() -> &'static str {
    COREDNS_CLUSTER_ROLE
}

#[must_use]
pub fn cluster_role_binding_name(salt: &str) -> String {
    suffixed(COREDNS_CLUSTER_ROLE_BINDING_BASE, salt)
}

#[must_use]
pub fn configmap_name(network: &str, salt: &str) -> String {
    suffixed(&format!("{COREDNS_CONFIG_PREFIX}-{network}"), salt)
}

/// The `Deployment` shares its name with the `ConfigMap` it mounts.
#[must_use]
pub fn deployment_name(network: &str, salt: &str) -> String {
    configmap_name(network, salt)
}

// ============================================================================
// Labels
// ============================================================================

/// Labels selecting the DNS pods of one network.
///
/// Used as the `Service` selector, the `Deployment` selector, and the
/// anti-affinity term, so they must stay stable for the life of the network.
#[must_use]
pub fn build_selector_labels(network: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_APP.into(), dns_service_name(network));
    labels
}

/// Builds the standard labels for per-network DNS resources.
///
/// # Arguments
///
/// * `network` - Name of the `Network` the resources belong to
///
/// # Returns
///
/// A `BTreeMap` of label key-value pairs, including the selector labels
#[must_use]
pub fn build_labels(network: &str) -> BTreeMap<String, String> {
    let mut labels = build_selector_labels(network);
    labels.insert(K8S_NAME.into(), APP_NAME_COREDNS.into());
    labels.insert(K8S_INSTANCE.into(), network.into());
    labels.insert(K8S_COMPONENT.into(), COMPONENT_DNS_SERVER.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_NETWORK_CONTROLLER.into());
    labels.insert(NETWORK_LABEL.into(), network.into());
    labels
}

/// Labels for the shared RBAC objects and `ServiceAccount`.
///
/// These objects are shared by every network of a tenant, so they carry no
/// network-specific labels.
fn build_shared_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_NAME.into(), APP_NAME_COREDNS.into());
    labels.insert(K8S_COMPONENT.into(), COMPONENT_DNS_SERVER.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_NETWORK_CONTROLLER.into());
    labels.insert(ADDON_MODE.into(), ADDON_MODE_RECONCILE.into());
    labels
}

// ============================================================================
// Resolver configuration
// ============================================================================

fn validate_template_value(field: &'static str, value: &str) -> Result<(), RenderError> {
    let invalid = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '{' || c == '}' || c == '/');
    if invalid {
        return Err(RenderError::InvalidValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Render the CoreDNS `Corefile` for one network.
///
/// The configuration serves `domain` on port 53 (UDP and TCP), caches for 30
/// seconds, forwards everything else to the node's resolver, exposes the
/// health, readiness and metrics endpoints, and rewrites the well-known
/// `kube-dns` and `kubernetes` service names to the network-specific ones.
///
/// # Errors
///
/// Returns [`RenderError`] if either value cannot be substituted into the
/// template or a placeholder is left behind.
pub fn render_corefile(domain: &str, network: &str) -> Result<String, RenderError> {
    validate_template_value("cluster domain", domain)?;
    validate_template_value("network name", network)?;

    let rendered = COREFILE_TEMPLATE
        .replace("{{CLUSTER_DOMAIN}}", domain)
        .replace("{{NETWORK_NAME}}", network)
        .replace("{{DNS_PORT}}", &DNS_PORT.to_string())
        .replace("{{METRICS_PORT}}", &METRICS_PORT.to_string())
        .replace("{{UPSTREAM_RESOLV_CONF}}", UPSTREAM_RESOLV_CONF)
        .replace("{{CACHE_SECS}}", &COREDNS_CACHE_SECS.to_string());

    if let Some(start) = rendered.find("{{") {
        let end = rendered[start..]
            .find("}}")
            .map_or(rendered.len(), |offset| start + offset + 2);
        return Err(RenderError::UnresolvedPlaceholder(
            rendered[start..end].to_string(),
        ));
    }

    Ok(rendered)
}

// ============================================================================
// Shared resources
// ============================================================================

/// Builds the CoreDNS `ServiceAccount` shared by all networks of a tenant.
#[must_use]
pub fn build_service_account(settings: &DnsSettings) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(service_account_name(&settings.salt)),
            namespace: Some(SYSTEM_NAMESPACE.into()),
            labels: Some(build_shared_labels()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Builds the `system:coredns` `ClusterRole`.
///
/// Grants the read access the CoreDNS `kubernetes` plugin needs to answer
/// in-cluster service queries.
#[must_use]
pub fn build_cluster_role() -> ClusterRole {
    let mut labels = build_shared_labels();
    labels.insert(RBAC_BOOTSTRAPPING.into(), RBAC_DEFAULTS.into());

    let list_watch = vec!["list".to_string(), "watch".to_string()];

    ClusterRole {
        metadata: ObjectMeta {
            name: Some(cluster_role_name().into()),
            labels: Some(labels),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec![
                    "endpoints".into(),
                    "services".into(),
                    "pods".into(),
                    "namespaces".into(),
                ]),
                verbs: list_watch.clone(),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["discovery.k8s.io".into()]),
                resources: Some(vec!["endpointslices".into()]),
                verbs: list_watch,
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["nodes".into()]),
                verbs: vec!["get".into()],
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

/// Builds the `ClusterRoleBinding` tying the CoreDNS `ServiceAccount` to its role.
#[must_use]
pub fn build_cluster_role_binding(settings: &DnsSettings) -> ClusterRoleBinding {
    let mut labels = build_shared_labels();
    labels.insert(RBAC_BOOTSTRAPPING.into(), RBAC_DEFAULTS.into());

    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(cluster_role_binding_name(&settings.salt)),
            labels: Some(labels),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".into(),
            kind: "ClusterRole".into(),
            name: cluster_role_name().into(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".into(),
            name: service_account_name(&settings.salt),
            namespace: Some(SYSTEM_NAMESPACE.into()),
            ..Default::default()
        }]),
    }
}

// ============================================================================
// Per-network resources
// ============================================================================

/// Builds the `ConfigMap` holding the network's rendered `Corefile`.
///
/// # Arguments
///
/// * `network` - Name of the `Network`
/// * `settings` - Process-wide DNS settings (domain and salt are used)
///
/// # Errors
///
/// Returns [`RenderError`] if the resolver configuration cannot be rendered
pub fn build_configmap(network: &str, settings: &DnsSettings) -> Result<ConfigMap, RenderError> {
    let name = configmap_name(network, &settings.salt);
    debug!(name = %name, network = %network, "Building CoreDNS ConfigMap");

    let corefile = render_corefile(&settings.cluster_domain, network)?;
    let mut data = BTreeMap::new();
    data.insert(COREFILE_KEY.to_string(), corefile);

    let mut labels = build_labels(network);
    labels.insert(ADDON_MODE.into(), ADDON_MODE_ENSURE_EXISTS.into());

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(SYSTEM_NAMESPACE.into()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

/// Builds the network's DNS `Service`.
///
/// The cluster IP is left unset; it is assigned by whichever allocator backs
/// the network and observed by the reconciler afterwards.
#[must_use]
pub fn build_service(network: &str) -> Service {
    let mut labels = build_labels(network);
    labels.insert(CLUSTER_SERVICE.into(), "true".into());
    labels.insert(ADDON_MODE.into(), ADDON_MODE_RECONCILE.into());

    let mut annotations = BTreeMap::new();
    annotations.insert("prometheus.io/port".into(), METRICS_PORT.to_string());
    annotations.insert("prometheus.io/scrape".into(), "true".into());

    Service {
        metadata: ObjectMeta {
            name: Some(dns_service_name(network)),
            namespace: Some(SYSTEM_NAMESPACE.into()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(build_selector_labels(network)),
            ports: Some(vec![
                ServicePort {
                    name: Some("dns".into()),
                    port: i32::from(DNS_PORT),
                    target_port: Some(IntOrString::Int(i32::from(DNS_PORT))),
                    protocol: Some("UDP".into()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("dns-tcp".into()),
                    port: i32::from(DNS_PORT),
                    target_port: Some(IntOrString::Int(i32::from(DNS_PORT))),
                    protocol: Some("TCP".into()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("metrics".into()),
                    port: i32::from(METRICS_PORT),
                    target_port: Some(IntOrString::Int(i32::from(METRICS_PORT))),
                    protocol: Some("TCP".into()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the CoreDNS `Deployment` for one network.
///
/// Creates a Deployment with:
/// - the CoreDNS container reading the `Corefile` mounted from the `ConfigMap`
/// - UDP/TCP port 53 and the metrics port exposed
/// - `/health` liveness and `/ready` readiness probes
/// - preferred anti-affinity across hosts, critical-addon toleration, Linux nodes only
/// - the control-plane endpoint injected through the environment
/// - the salted shared `ServiceAccount`
///
/// # Arguments
///
/// * `network` - Name of the `Network`
/// * `settings` - Process-wide DNS settings
///
/// # Returns
///
/// A Kubernetes Deployment resource ready for creation
#[must_use]
pub fn build_deployment(network: &str, settings: &DnsSettings) -> Deployment {
    let name = deployment_name(network, &settings.salt);
    debug!(name = %name, network = %network, "Building CoreDNS Deployment");

    let labels = build_labels(network);
    let selector = build_selector_labels(network);

    Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(SYSTEM_NAMESPACE.into()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(COREDNS_REPLICAS),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".into()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::Int(1)),
                    ..Default::default()
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(build_pod_spec(network, settings)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_pod_spec(network: &str, settings: &DnsSettings) -> PodSpec {
    let mut node_selector = BTreeMap::new();
    node_selector.insert(NODE_OS_LABEL.to_string(), NODE_OS_LINUX.to_string());

    PodSpec {
        priority_class_name: Some(PRIORITY_CLASS_CRITICAL.into()),
        service_account_name: Some(service_account_name(&settings.salt)),
        tolerations: Some(vec![Toleration {
            key: Some(TOLERATION_CRITICAL_ADDONS.into()),
            operator: Some("Exists".into()),
            ..Default::default()
        }]),
        node_selector: Some(node_selector),
        affinity: Some(build_anti_affinity(network)),
        containers: vec![build_coredns_container(settings)],
        dns_policy: Some("Default".into()),
        volumes: Some(vec![Volume {
            name: VOLUME_CONFIG.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: configmap_name(network, &settings.salt),
                items: Some(vec![KeyToPath {
                    key: COREFILE_KEY.into(),
                    path: COREFILE_KEY.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Prefer spreading a network's DNS replicas across hosts.
fn build_anti_affinity(network: &str) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: ANTI_AFFINITY_WEIGHT,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_expressions: Some(vec![LabelSelectorRequirement {
                                key: K8S_APP.into(),
                                operator: "In".into(),
                                values: Some(vec![dns_service_name(network)]),
                            }]),
                            ..Default::default()
                        }),
                        topology_key: HOSTNAME_TOPOLOGY_KEY.into(),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_coredns_container(settings: &DnsSettings) -> Container {
    let mut limits = BTreeMap::new();
    limits.insert("memory".to_string(), Quantity("170Mi".into()));
    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), Quantity("100m".into()));
    requests.insert("memory".to_string(), Quantity("70Mi".into()));

    Container {
        name: CONTAINER_NAME_COREDNS.into(),
        image: Some(settings.image.clone()),
        image_pull_policy: Some("IfNotPresent".into()),
        args: Some(vec!["-conf".into(), COREFILE_PATH.into()]),
        resources: Some(ResourceRequirements {
            limits: Some(limits),
            requests: Some(requests),
            ..Default::default()
        }),
        env: Some(vec![
            EnvVar {
                name: ENV_APISERVER_HOST.into(),
                value: Some(settings.apiserver_host.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_APISERVER_PORT.into(),
                value: Some(settings.apiserver_port.to_string()),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_CONFIG.into(),
            mount_path: COREFILE_MOUNT_PATH.into(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ports: Some(vec![
            ContainerPort {
                name: Some("dns".into()),
                container_port: i32::from(DNS_PORT),
                protocol: Some("UDP".into()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("dns-tcp".into()),
                container_port: i32::from(DNS_PORT),
                protocol: Some("TCP".into()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("metrics".into()),
                container_port: i32::from(METRICS_PORT),
                protocol: Some("TCP".into()),
                ..Default::default()
            },
        ]),
        liveness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(HEALTH_PATH.into()),
                port: IntOrString::Int(i32::from(HEALTH_PORT)),
                scheme: Some("HTTP".into()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(LIVENESS_INITIAL_DELAY_SECS),
            timeout_seconds: Some(LIVENESS_TIMEOUT_SECS),
            success_threshold: Some(LIVENESS_SUCCESS_THRESHOLD),
            failure_threshold: Some(LIVENESS_FAILURE_THRESHOLD),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(READY_PATH.into()),
                port: IntOrString::Int(i32::from(READY_PORT)),
                scheme: Some("HTTP".into()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            capabilities: Some(Capabilities {
                add: Some(vec!["NET_BIND_SERVICE".into()]),
                drop: Some(vec!["all".into()]),
            }),
            read_only_root_filesystem: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "dns_resources_tests.rs"]
mod dns_resources_tests;
