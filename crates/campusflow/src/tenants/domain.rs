use serde::{Deserialize, Serialize};

use crate::workflows::admission::stages::WorkflowDefinition;

/// Per-institution configuration document, read-only from this crate's
/// perspective. Production keeps these in a document store; the directory
/// port hides where they come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub institution_id: String,
    pub profile: InstitutionProfile,
    #[serde(default)]
    pub careers: Vec<Career>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowDefinition>,
}

impl TenantConfig {
    /// Looks up an active career by id. Deactivated careers are treated as
    /// absent so stale prospections cannot enroll into them.
    pub fn career(&self, career_id: &str) -> Option<&Career> {
        self.careers
            .iter()
            .find(|career| career.career_id == career_id && career.is_active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<InstitutionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstitutionKind {
    Public,
    Private,
}

impl InstitutionKind {
    pub fn label(&self) -> &'static str {
        match self {
            InstitutionKind::Public => "public",
            InstitutionKind::Private => "private",
        }
    }
}

/// Catalog entry for a career offered by the institution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Career {
    pub career_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
