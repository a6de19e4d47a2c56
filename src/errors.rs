// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the Network controller.
//!
//! The taxonomy mirrors how the worker loop treats failures:
//!
//! - [`KeyError`] - the queue item is not `tenant/name`; forgotten, never retried
//! - [`ApiError`] - a resource API call failed; `NotFound` and `AlreadyExists`
//!   drive the ensurer, everything else is transient
//! - [`RenderError`] - the resolver configuration template could not be rendered
//! - [`ReconcileError`] - the single error a reconcile returns to the worker
//! - [`ConfigError`] - startup misconfiguration, never reaches a reconcile
//! - [`ControllerError`] - lifecycle failures such as a cache that never synced

use crate::key::NetworkKey;
use thiserror::Error;

/// A work-queue item that does not decode into `(tenant, name)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("malformed queue key {0:?}: expected \"tenant/name\"")]
    Malformed(String),
}

/// Outcome classes of a tenant-scoped resource API call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The object does not exist (HTTP 404).
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    /// A create raced with another writer (HTTP 409, reason `AlreadyExists`).
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    /// Optimistic concurrency failure (HTTP 409).
    #[error("conflict writing {kind} {name:?}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    /// Network errors, timeouts, throttling, 5xx and undecodable responses.
    #[error("resource API request failed: {0}")]
    Transient(String),
}

impl ApiError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Classify a kube client error for an operation on `kind`/`name`.
    #[must_use]
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                Self::already_exists(kind, name)
            }
            kube::Error::Api(resp) if resp.code == 409 => Self::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message: resp.message.clone(),
            },
            other => Self::Transient(other.to_string()),
        }
    }
}

/// Failure to render the CoreDNS resolver configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("template placeholder {0} was left unsubstituted")]
    UnresolvedPlaceholder(String),

    #[error("invalid value {value:?} for template field {field}")]
    InvalidValue { field: &'static str, value: String },
}

/// The error a single reconcile returns to the worker loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("failed to provision DNS for network {} in tenant {}: {}", .key.name, .key.tenant, .source)]
    Api {
        key: NetworkKey,
        #[source]
        source: ApiError,
    },

    #[error("failed to render resolver config for network {} in tenant {}: {}", .key.name, .key.tenant, .source)]
    Render {
        key: NetworkKey,
        #[source]
        source: RenderError,
    },

    #[error("DNS service {service} of flat network {} in tenant {} has no cluster IP yet", .key.name, .key.tenant)]
    DnsServiceIpNotAllocated { key: NetworkKey, service: String },
}

impl ReconcileError {
    pub fn api(key: &NetworkKey, source: ApiError) -> Self {
        Self::Api {
            key: key.clone(),
            source,
        }
    }

    /// The network the failed reconcile was for.
    #[must_use]
    pub fn key(&self) -> &NetworkKey {
        match self {
            Self::Api { key, .. }
            | Self::Render { key, .. }
            | Self::DnsServiceIpNotAllocated { key, .. } => key,
        }
    }

    /// Whether the worker should re-queue the key with backoff.
    ///
    /// Render errors are permanent: the Network's name and the process
    /// settings they depend on cannot change between retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Render { .. })
    }
}

/// Invalid process configuration detected at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cluster domain must not be empty")]
    EmptyClusterDomain,

    #[error("invalid cluster domain {0:?}: must be a DNS name without whitespace")]
    InvalidClusterDomain(String),

    #[error("invalid resource name salt {0:?}: only lowercase alphanumerics, '-' and '.' are allowed")]
    InvalidSalt(String),

    #[error("kube-apiserver port must not be 0")]
    InvalidApiServerPort,
}

/// Failures of the controller lifecycle itself.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("failed to wait for network caches to sync")]
    CacheSyncFailed,

    #[error("failed to build resource API client: {0}")]
    Client(#[source] kube::Error),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
