//! Tenant scoping passed through to every backend call.

use serde::{Deserialize, Serialize};

use crate::id::ID;

/// Identifies which tenant and course an editor is working on.
///
/// The core never inspects these values; backends use them to qualify reads
/// and writes. The course id doubles as the id of the root container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub course_id: ID,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, course_id: impl Into<ID>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            course_id: course_id.into(),
        }
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.course_id)
    }
}
