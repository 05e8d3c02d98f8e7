use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::injection::InjectionKey;
use crate::domain::templates::{TemplateDefinition, TemplateScope};

fn default_activate() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TemplatePublishRequest {
    pub scope: TemplateScope,
    pub tenant_code: Option<String>,
    pub workspace_code: Option<String>,
    pub document_type_code: String,
    pub body: String,
    #[serde(default)]
    pub placeholders: Vec<InjectionKey>,
    #[serde(default = "default_activate")]
    pub activate: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TemplateActivationRequest {
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateListQuery {
    pub scope: Option<TemplateScope>,
    pub tenant: Option<String>,
    pub workspace: Option<String>,
    pub document_type: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub id: Uuid,
    pub scope: TemplateScope,
    pub tenant_code: Option<String>,
    pub workspace_code: Option<String>,
    pub document_type_code: String,
    pub version: i32,
    pub active: bool,
    pub placeholders: Vec<InjectionKey>,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<TemplateDefinition> for TemplateResponse {
    fn from(template: TemplateDefinition) -> Self {
        Self {
            id: template.id,
            scope: template.scope,
            tenant_code: template.tenant_code,
            workspace_code: template.workspace_code,
            document_type_code: template.document_type_code,
            version: template.version,
            active: template.active,
            placeholders: template.placeholders,
            body: template.body,
            created_at: template.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub items: Vec<TemplateResponse>,
}

#[derive(Debug, Serialize)]
pub struct CatalogReloadResponse {
    pub templates: usize,
}
