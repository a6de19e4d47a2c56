// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Work-queue keys for tenant networks.
//!
//! A key is `tenant + "/" + name`. Tenants and names never contain `/`, so a
//! well-formed key splits into exactly two parts.

use crate::errors::KeyError;
use std::fmt;

/// Separator between tenant and name in an encoded key.
pub const KEY_SEPARATOR: char = '/';

/// Identity of a [`crate::crd::Network`]: `(tenant, name)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkKey {
    pub tenant: String,
    pub name: String,
}

impl NetworkKey {
    pub fn new(tenant: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            name: name.into(),
        }
    }

    /// Encode into a queue key.
    #[must_use]
    pub fn encode(&self) -> String {
        encode_key(&self.tenant, &self.name)
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.tenant, self.name)
    }
}

/// Encode `(tenant, name)` into a queue key.
#[must_use]
pub fn encode_key(tenant: &str, name: &str) -> String {
    format!("{tenant}{KEY_SEPARATOR}{name}")
}

/// Decode a queue key back into `(tenant, name)`.
///
/// # Errors
///
/// Returns [`KeyError::Malformed`] when splitting on the separator yields
/// anything other than two parts.
pub fn decode_key(key: &str) -> Result<NetworkKey, KeyError> {
    let mut parts = key.split(KEY_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(tenant), Some(name), None) => Ok(NetworkKey::new(tenant, name)),
        _ => Err(KeyError::Malformed(key.to_string())),
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod key_tests;
