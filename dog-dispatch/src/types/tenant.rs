use serde::{Deserialize, Serialize};
use std::fmt;

/// Fairness unit a job belongs to
///
/// Jobs enqueued without a tenant all share the implicit lane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantKey(Option<String>);

impl TenantKey {
    /// Create a key for a named tenant
    pub fn new(tenant: impl Into<String>) -> Self {
        Self(Some(tenant.into()))
    }

    /// The shared lane for jobs without a tenant
    pub fn implicit() -> Self {
        Self(None)
    }

    pub fn is_implicit(&self) -> bool {
        self.0.is_none()
    }

    /// Get the tenant name, if any
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "<implicit>"),
        }
    }
}

impl From<&str> for TenantKey {
    fn from(tenant: &str) -> Self {
        Self::new(tenant)
    }
}

impl From<String> for TenantKey {
    fn from(tenant: String) -> Self {
        Self::new(tenant)
    }
}

impl From<Option<String>> for TenantKey {
    fn from(tenant: Option<String>) -> Self {
        Self(tenant)
    }
}
