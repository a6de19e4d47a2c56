// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration.
//!
//! Every flag can also be given through the environment:
//!
//! | Flag | Environment | Default |
//! |------|-------------|---------|
//! | `--cluster-domain` | `CLUSTER_DOMAIN` | `cluster.local` |
//! | `--kube-apiserver-ip` | `KUBE_APISERVER_IP` | required |
//! | `--kube-apiserver-port` | `KUBE_APISERVER_PORT` | `6443` |
//! | `--resource-name-salt` | `RESOURCE_NAME_SALT` | empty |
//! | `--concurrent-workers` | `CONCURRENT_WORKERS` | `4` |
//! | `--kubeconfig` | `KUBECONFIG` | inferred |
//! | `--coredns-image` | `COREDNS_IMAGE` | `coredns/coredns:1.8.0` |

use crate::constants::{
    DEFAULT_APISERVER_PORT, DEFAULT_CLUSTER_DOMAIN, DEFAULT_CONCURRENT_WORKERS,
    DEFAULT_COREDNS_IMAGE,
};
use crate::dns_resources::DnsSettings;
use crate::errors::ConfigError;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments of the controller.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "tenant-network-controller",
    version,
    about = "Provisions a dedicated CoreDNS service for every tenant Network"
)]
pub struct Args {
    /// Cluster DNS domain served by each network's CoreDNS
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// API server address injected into the CoreDNS pods
    #[arg(long, env = "KUBE_APISERVER_IP")]
    pub kube_apiserver_ip: IpAddr,

    /// API server port injected into the CoreDNS pods
    #[arg(long, env = "KUBE_APISERVER_PORT", default_value_t = DEFAULT_APISERVER_PORT)]
    pub kube_apiserver_port: u16,

    /// Suffix appended to the shared and per-network CoreDNS object names
    #[arg(long, env = "RESOURCE_NAME_SALT", default_value = "")]
    pub resource_name_salt: String,

    /// Number of reconcile workers; non-positive values fall back to the default
    #[arg(
        long,
        env = "CONCURRENT_WORKERS",
        default_value_t = 4,
        allow_negative_numbers = true
    )]
    pub concurrent_workers: i32,

    /// Path to a kubeconfig file; in-cluster or default config otherwise
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// CoreDNS container image
    #[arg(long, env = "COREDNS_IMAGE", default_value = DEFAULT_COREDNS_IMAGE)]
    pub coredns_image: String,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub dns: DnsSettings,
    pub workers: usize,
    pub kubeconfig: Option<PathBuf>,
}

/// Worker count with non-positive values replaced by the default.
#[must_use]
pub fn effective_workers(requested: i32) -> usize {
    usize::try_from(requested)
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_CONCURRENT_WORKERS)
}

fn validate_cluster_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::EmptyClusterDomain);
    }
    let valid = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !domain.starts_with('.')
        && !domain.contains("..");
    if !valid {
        return Err(ConfigError::InvalidClusterDomain(domain.to_string()));
    }
    Ok(())
}

fn validate_salt(salt: &str) -> Result<(), ConfigError> {
    let valid = salt
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if !valid {
        return Err(ConfigError::InvalidSalt(salt.to_string()));
    }
    Ok(())
}

impl ControllerConfig {
    /// Validate parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty or malformed cluster domain, a salt
    /// that cannot appear in object names, or port 0.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        validate_cluster_domain(&args.cluster_domain)?;
        validate_salt(&args.resource_name_salt)?;
        if args.kube_apiserver_port == 0 {
            return Err(ConfigError::InvalidApiServerPort);
        }

        Ok(Self {
            dns: DnsSettings {
                cluster_domain: args.cluster_domain,
                salt: args.resource_name_salt,
                apiserver_host: args.kube_apiserver_ip,
                apiserver_port: args.kube_apiserver_port,
                image: args.coredns_image,
            },
            workers: effective_workers(args.concurrent_workers),
            kubeconfig: args.kubeconfig,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
