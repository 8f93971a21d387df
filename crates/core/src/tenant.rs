//! Tenant identity types and the per-operation tenant context.

use crate::error::{ContextdError, Result};
use std::fmt;

/// Non-empty opaque string naming an organization boundary.
///
/// `TenantId` is the only mandatory scope; `TeamId` and `ProjectId` are
/// optional narrower scopes beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    /// Construct a `TenantId`, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ContextdError::InvalidTenant(
                "tenant_id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional narrower scope beneath a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeamId(String);

impl TeamId {
    /// Construct a `TeamId` from any non-empty string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Optional narrower scope beneath a tenant (and optionally a team).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(String);

impl ProjectId {
    /// Construct a `ProjectId` from any non-empty string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The identifier triple attached to every operation.
///
/// Invariant: whenever a tenant is "present" (this struct exists in the
/// operation context), `tenant_id` is non-empty — enforced at construction
/// by [`TenantId::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// The mandatory tenant scope.
    pub tenant_id: TenantId,
    /// Optional team scope beneath the tenant.
    pub team_id: Option<TeamId>,
    /// Optional project scope beneath the tenant (and team, if present).
    pub project_id: Option<ProjectId>,
}

impl TenantContext {
    /// Construct a new context for the given tenant, with no team/project.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            team_id: None,
            project_id: None,
        }
    }

    /// Attach a team scope.
    pub fn with_team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    /// Attach a project scope.
    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Re-validate the tenant id. `TenantId::new` already guarantees
    /// non-emptiness, so this only exists for contexts that were
    /// deserialized rather than constructed through the builder.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.as_str().is_empty() {
            return Err(ContextdError::InvalidTenant(
                "tenant_id must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// A defensive copy of the tenant fields, so a caller mutating the
    /// context's backing struct after the operation started cannot race
    /// with the in-flight mutation (spec §4.6, step 1).
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

/// Ambient, request-scoped bag carrying an optional [`TenantContext`].
///
/// A real deployment attaches this to whatever per-request context type the
/// caller's framework provides (e.g. a `tokio` task-local, or a field on a
/// request struct). This type models the ambient bag itself so the rest of
/// the crate does not need to depend on any particular framework's context
/// type.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    tenant: Option<TenantContext>,
    /// Optional deadline, honored by backend RPCs (spec §5, Cancellation).
    pub deadline: Option<std::time::Duration>,
}

impl OpContext {
    /// An empty context carrying no tenant — used by tests and by the
    /// `None` isolation mode.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A context carrying the given tenant.
    pub fn with_tenant(tenant: TenantContext) -> Self {
        Self {
            tenant: Some(tenant),
            deadline: None,
        }
    }

    /// Returns the `TenantContext` or `MissingTenant` if absent.
    ///
    /// Mirrors `TenantFromContext` in spec §4.1: missing or wrongly-typed
    /// context both surface as the same sentinel error.
    pub fn tenant(&self) -> Result<&TenantContext> {
        self.tenant.as_ref().ok_or(ContextdError::MissingTenant)
    }
}
