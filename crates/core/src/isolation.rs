//! Isolation modes: the polymorphic policy deciding how tenant identity
//! participates in storage I/O (spec §4.1).

use crate::document::Document;
use crate::error::Result;
use crate::filter::{merge_filters, reject_reserved_keys, FilterMap};
use crate::tenant::TenantContext;

/// Tagged variant over the three isolation policies. Stateless values —
/// pass by `Copy`/by value, not behind a vtable, since all three carry no
/// data of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationMode {
    /// Default, fail-closed: injects tenant scope into filters and
    /// metadata, overwriting caller-supplied values in those keys.
    Payload,
    /// Relies on structural separation (a distinct store per tenant path).
    /// Still validates the tenant and stamps metadata, but does not use the
    /// stamped fields for query-time filtering.
    Filesystem,
    /// No isolation at all. Reserved for tests.
    None,
}

impl Default for IsolationMode {
    fn default() -> Self {
        IsolationMode::Payload
    }
}

impl IsolationMode {
    /// Human-readable mode name, for config/diagnostics.
    pub fn mode_name(&self) -> &'static str {
        match self {
            IsolationMode::Payload => "payload",
            IsolationMode::Filesystem => "filesystem",
            IsolationMode::None => "none",
        }
    }

    /// Validate the tenant per this mode's rules.
    ///
    /// `None` mode always succeeds (even with no tenant present); the other
    /// two modes require a present, valid tenant.
    pub fn validate(&self, tenant: Option<&TenantContext>) -> Result<()> {
        match self {
            IsolationMode::None => Ok(()),
            IsolationMode::Payload | IsolationMode::Filesystem => {
                use crate::error::ContextdError;
                let tenant = tenant.ok_or(ContextdError::MissingTenant)?;
                tenant.validate()
            }
        }
    }

    /// Inject tenant scope into a caller-supplied filter map.
    ///
    /// `Payload`: merges tenant fields in, tenant winning on conflict.
    /// `Filesystem`: validates the tenant but returns the filter unchanged
    /// (isolation is structural, not filter-based).
    /// `None`: returns the filter unchanged, no validation.
    ///
    /// The reserved-key rejection (spec §4.1, Testable Property 2) runs
    /// first and unconditionally — a caller can never smuggle the tenant
    /// scope through a public filter argument regardless of mode.
    pub fn inject_filter(
        &self,
        user_filters: FilterMap,
        tenant: Option<&TenantContext>,
    ) -> Result<FilterMap> {
        reject_reserved_keys(&user_filters)?;
        match self {
            IsolationMode::None => Ok(user_filters),
            IsolationMode::Filesystem => {
                self.validate(tenant)?;
                Ok(user_filters)
            }
            IsolationMode::Payload => {
                self.validate(tenant)?;
                let tenant = tenant.expect("validated above");
                Ok(merge_filters(&user_filters, tenant))
            }
        }
    }

    /// Stamp tenant scope onto every document's metadata, overwriting any
    /// caller-supplied values in those keys (this is what blocks metadata
    /// poisoning per spec §4.1).
    ///
    /// `Filesystem` still stamps the audit fields (for traceability) but
    /// they are not used for query-time filtering. `None` does nothing.
    pub fn inject_metadata(
        &self,
        mut docs: Vec<Document>,
        tenant: Option<&TenantContext>,
    ) -> Result<Vec<Document>> {
        match self {
            IsolationMode::None => Ok(docs),
            IsolationMode::Payload | IsolationMode::Filesystem => {
                self.validate(tenant)?;
                let tenant = tenant.expect("validated above");
                for doc in &mut docs {
                    doc.metadata = merge_filters(&doc.metadata, tenant);
                }
                Ok(docs)
            }
        }
    }
}
