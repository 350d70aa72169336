//! Authorization capability.
//!
//! Authorization decisions are made outside of the control plane; this module only defines the
//! seam the control plane calls through, along with the decorators the worker config enables.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::descriptor::{ComponentKind, JobIdentity};

/// The caller on whose behalf an operation is performed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subject {
    /// The authenticated role of the caller, if any.
    pub role: Option<String>,
}

impl Subject {
    /// Create a subject for the given role.
    pub fn role(role: impl Into<String>) -> Self {
        Self { role: Some(role.into()) }
    }
}

/// The resource an operation targets.
#[derive(Clone, Copy, Debug)]
pub struct ResourceRef<'a> {
    pub kind: ComponentKind,
    pub identity: &'a JobIdentity,
}

/// A capability deciding whether a subject may operate on a resource.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Check if the given subject is authorized to operate on the given resource.
    async fn is_authorized(&self, subject: &Subject, resource: ResourceRef<'_>) -> Result<bool>;
}

/// An authorizer used when authorization is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn is_authorized(&self, _subject: &Subject, _resource: ResourceRef<'_>) -> Result<bool> {
        Ok(true)
    }
}

/// An authorizer which grants everything to super-user roles and defers to an inner authorizer
/// for all other subjects.
pub struct SuperUserAuthorizer {
    roles: HashSet<String>,
    inner: Arc<dyn Authorizer>,
}

impl SuperUserAuthorizer {
    /// Create a new instance.
    pub fn new(roles: impl IntoIterator<Item = String>, inner: Arc<dyn Authorizer>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            inner,
        }
    }
}

#[async_trait]
impl Authorizer for SuperUserAuthorizer {
    async fn is_authorized(&self, subject: &Subject, resource: ResourceRef<'_>) -> Result<bool> {
        let role = match subject.role.as_deref() {
            Some(role) if !role.is_empty() => role,
            _ => return Ok(false),
        };
        if self.roles.contains(role) {
            return Ok(true);
        }
        self.inner.is_authorized(subject, resource).await
    }
}
