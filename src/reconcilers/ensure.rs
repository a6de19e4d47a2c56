// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Idempotent get-then-create for dependent resources.
//!
//! Ownership is create-only: an object that already exists is returned as-is
//! and never updated, so edits made by operators or other controllers stick.
//!
//! # Example
//!
//! ```rust,no_run
//! use tenant_network_controller::api::{ResourceApi, Scope};
//! use tenant_network_controller::dns_resources::build_service;
//! use tenant_network_controller::errors::ApiError;
//! use tenant_network_controller::reconcilers::ensure::ensure_resource;
//!
//! async fn example<A: ResourceApi>(api: &A) -> Result<(), ApiError> {
//!     let scope = Scope::namespaced("t1", "kube-system");
//!     let service = ensure_resource(api, &scope, &build_service("blue")).await?;
//!     println!("{:?}", service.spec);
//!     Ok(())
//! }
//! ```

use crate::api::{ManagedResource, ResourceApi, Scope};
use crate::errors::ApiError;
use tracing::{debug, info};

/// Make sure `desired` exists in `scope`, creating it if missing.
///
/// 1. Read the object; if found, return it unchanged.
/// 2. On `NotFound`, create it.
/// 3. If the create loses a race (`AlreadyExists`), read it again.
///
/// # Arguments
///
/// * `api` - Tenant-scoped resource API
/// * `scope` - Tenant and, for namespaced kinds, namespace of the object
/// * `desired` - Fully built object; its `metadata.name` identifies it
///
/// # Returns
///
/// The object as stored by the API server.
///
/// # Errors
///
/// Returns the [`ApiError`] of the first call that failed for any other
/// reason. Nothing is retried here; the worker loop owns retries.
pub async fn ensure_resource<A, K>(api: &A, scope: &Scope, desired: &K) -> Result<K, ApiError>
where
    A: ResourceApi,
    K: ManagedResource,
{
    let kind = K::kind(&());
    let name = desired.meta().name.clone().unwrap_or_default();

    match api.get::<K>(scope, &name).await {
        Ok(existing) => {
            debug!(scope = %scope, kind = %kind, name = %name, "Resource already exists");
            return Ok(existing);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    match api.create(scope, desired).await {
        Ok(created) => {
            info!(scope = %scope, kind = %kind, name = %name, "Created resource");
            Ok(created)
        }
        Err(e) if e.is_already_exists() => {
            debug!(
                scope = %scope,
                kind = %kind,
                name = %name,
                "Resource created concurrently, reading it back"
            );
            api.get::<K>(scope, &name).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "ensure_tests.rs"]
mod ensure_tests;
