//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::api_keys::{ApiKeyRecord, ApiScope};
use crate::domain::injection::InjectionKey;
use crate::domain::templates::{TemplateCoordinates, TemplateDefinition, TemplateScope};
use crate::domain::tenants::TenantRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateQueryFilter {
    pub scope: Option<TemplateScope>,
    pub tenant_code: Option<String>,
    pub workspace_code: Option<String>,
    pub document_type_code: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct PublishTemplateParams {
    pub coordinates: TemplateCoordinates,
    pub body: String,
    pub placeholders: Vec<InjectionKey>,
    pub activate: bool,
}

#[async_trait]
pub trait TemplatesRepo: Send + Sync {
    async fn list_templates(
        &self,
        filter: &TemplateQueryFilter,
    ) -> Result<Vec<TemplateDefinition>, RepoError>;

    /// Every template currently flagged active, across all scopes.
    async fn load_active_templates(&self) -> Result<Vec<TemplateDefinition>, RepoError>;

    async fn find_template(&self, id: Uuid) -> Result<Option<TemplateDefinition>, RepoError>;
}

#[async_trait]
pub trait TemplatesWriteRepo: Send + Sync {
    /// Stores a new version at the given coordinates. The version is one past
    /// the highest existing version for the same coordinates.
    async fn publish_template(
        &self,
        params: PublishTemplateParams,
    ) -> Result<TemplateDefinition, RepoError>;

    async fn set_template_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<TemplateDefinition, RepoError>;
}

#[async_trait]
pub trait TenantsRepo: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<TenantRecord>, RepoError>;

    async fn upsert_tenant(&self, tenant: &TenantRecord) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateApiKeyParams {
    pub name: String,
    pub tenant_code: Option<String>,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub scopes: Vec<ApiScope>,
    pub expires_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait ApiKeysRepo: Send + Sync {
    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError>;

    async fn list_keys(&self) -> Result<Vec<ApiKeyRecord>, RepoError>;

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError>;

    async fn revoke_key(&self, id: Uuid, revoked_at: OffsetDateTime) -> Result<(), RepoError>;

    async fn update_last_used(
        &self,
        id: Uuid,
        last_used_at: OffsetDateTime,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
