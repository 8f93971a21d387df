//! Filter algebra: merging tenant scope into caller filters, and rejecting
//! attempts by callers to steer the tenant scope through public arguments.

use crate::document::MetadataValue;
use crate::error::{ContextdError, Result};
use crate::store::RESERVED_TENANT_KEYS;
use crate::tenant::TenantContext;
use std::collections::BTreeMap;

/// A caller- or tenant-supplied filter map.
pub type FilterMap = BTreeMap<String, MetadataValue>;

/// Reject a caller-supplied filter that contains any reserved tenant key.
///
/// This is the stricter, backend-independent rule from spec §4.1: it runs
/// before any isolation-mode-specific injection and before any backend is
/// contacted (Testable Property 2).
pub fn reject_reserved_keys(user_filters: &FilterMap) -> Result<()> {
    for key in RESERVED_TENANT_KEYS {
        if user_filters.contains_key(*key) {
            return Err(ContextdError::TenantFilterInUserFilters((*key).to_string()));
        }
    }
    Ok(())
}

/// Merge the tenant scope into a filter map, tenant fields winning over any
/// pre-existing keys of the same name.
///
/// Callers should run [`reject_reserved_keys`] on the *user-supplied* filter
/// map before calling this — this function is the injection step used by
/// `IsolationMode::Payload`, which is deliberately permissive about
/// overwriting (it is only ever called with filters that already passed the
/// reserved-key check upstream).
pub fn merge_filters(user_filters: &FilterMap, tenant: &TenantContext) -> FilterMap {
    let mut merged = user_filters.clone();
    merged.insert(
        "tenant_id".to_string(),
        MetadataValue::String(tenant.tenant_id.as_str().to_string()),
    );
    if let Some(team) = &tenant.team_id {
        merged.insert(
            "team_id".to_string(),
            MetadataValue::String(team.as_str().to_string()),
        );
    }
    if let Some(project) = &tenant.project_id {
        merged.insert(
            "project_id".to_string(),
            MetadataValue::String(project.as_str().to_string()),
        );
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{ProjectId, TeamId, TenantId};

    fn tenant() -> TenantContext {
        TenantContext::new(TenantId::new("org-1").unwrap())
            .with_team(TeamId::new("team-a"))
            .with_project(ProjectId::new("proj-x"))
    }

    #[test]
    fn rejects_any_reserved_key() {
        for key in RESERVED_TENANT_KEYS {
            let mut f = FilterMap::new();
            f.insert((*key).to_string(), MetadataValue::String("x".into()));
            let err = reject_reserved_keys(&f).unwrap_err();
            assert!(matches!(err, ContextdError::TenantFilterInUserFilters(_)));
        }
    }

    #[test]
    fn accepts_filters_without_reserved_keys() {
        let mut f = FilterMap::new();
        f.insert("category".to_string(), MetadataValue::String("docs".into()));
        assert!(reject_reserved_keys(&f).is_ok());
    }

    #[test]
    fn tenant_fields_win_on_merge() {
        let mut f = FilterMap::new();
        f.insert("category".to_string(), MetadataValue::String("docs".into()));
        let merged = merge_filters(&f, &tenant());
        assert_eq!(
            merged.get("tenant_id"),
            Some(&MetadataValue::String("org-1".into()))
        );
        assert_eq!(
            merged.get("team_id"),
            Some(&MetadataValue::String("team-a".into()))
        );
        assert_eq!(
            merged.get("project_id"),
            Some(&MetadataValue::String("proj-x".into()))
        );
        assert_eq!(
            merged.get("category"),
            Some(&MetadataValue::String("docs".into()))
        );
    }
}
