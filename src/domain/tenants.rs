use serde::{Deserialize, Serialize};

/// A tenant known to the engine.
///
/// `system_workspace_code` overrides the configured default system workspace
/// for this tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub code: String,
    pub system_workspace_code: Option<String>,
}
