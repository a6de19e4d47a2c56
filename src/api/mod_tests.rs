// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `api/mod.rs`

#[cfg(test)]
mod tests {
    use crate::api::{tenant_url_path, Scope, TenantNetwork};
    use crate::crd::{Network, NetworkPhase};
    use crate::key::NetworkKey;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, Service};
    use k8s_openapi::api::rbac::v1::ClusterRole;
    use serde_json::json;

    #[test]
    fn test_core_group_namespaced_path() {
        let scope = Scope::namespaced("t1", "kube-system");
        assert_eq!(
            tenant_url_path::<Service>(&scope),
            "/api/v1/tenants/t1/namespaces/kube-system/services"
        );
        assert_eq!(
            tenant_url_path::<ConfigMap>(&scope),
            "/api/v1/tenants/t1/namespaces/kube-system/configmaps"
        );
    }

    #[test]
    fn test_named_group_paths() {
        assert_eq!(
            tenant_url_path::<Deployment>(&Scope::namespaced("t1", "kube-system")),
            "/apis/apps/v1/tenants/t1/namespaces/kube-system/deployments"
        );
        assert_eq!(
            tenant_url_path::<ClusterRole>(&Scope::cluster("t1")),
            "/apis/rbac.authorization.k8s.io/v1/tenants/t1/clusterroles"
        );
        assert_eq!(
            tenant_url_path::<Network>(&Scope::cluster("t1")),
            "/apis/arktos.futurewei.com/v1/tenants/t1/networks"
        );
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::cluster("t1").to_string(), "t1");
        assert_eq!(Scope::namespaced("t1", "ns").to_string(), "t1/ns");
    }

    #[test]
    fn test_tenant_network_from_value() {
        let value = json!({
            "apiVersion": "arktos.futurewei.com/v1",
            "kind": "Network",
            "metadata": {"name": "n1", "tenant": "t1", "resourceVersion": "7"},
            "spec": {"type": "flat"}
        });
        let tn = TenantNetwork::from_value(value).unwrap();
        assert_eq!(tn.key, NetworkKey::new("t1", "n1"));
        assert!(tn.network.is_flat());
        assert_eq!(tn.resource_version(), Some("7"));
    }

    #[test]
    fn test_tenant_network_defaults_to_system_tenant() {
        let value = json!({
            "apiVersion": "arktos.futurewei.com/v1",
            "kind": "Network",
            "metadata": {"name": "default"},
            "spec": {"type": "flat"}
        });
        let tn = TenantNetwork::from_value(value).unwrap();
        assert_eq!(tn.key, NetworkKey::new("system", "default"));
    }

    #[test]
    fn test_tenant_network_tolerates_foreign_fields() {
        let value = json!({
            "apiVersion": "arktos.futurewei.com/v1",
            "kind": "Network",
            "metadata": {"name": "n1", "tenant": "t1"},
            "spec": {},
            "status": {"phase": "Failed", "dnsServiceIP": "10.0.0.9"}
        });
        let tn = TenantNetwork::from_value(value).unwrap();
        assert!(!tn.network.is_flat());
        assert_eq!(tn.network.phase(), NetworkPhase::Unknown);
        assert_eq!(tn.network.dns_service_ip(), "10.0.0.9");
    }

    #[test]
    fn test_tenant_network_rejects_garbage() {
        assert!(TenantNetwork::from_value(json!({"metadata": 5})).is_err());
    }
}
