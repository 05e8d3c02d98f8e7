//! Publishing and activation of template versions.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::auth::{AuthError, Principal};
use crate::application::catalog::{CatalogHandle, CatalogLoader};
use crate::application::repos::{
    PublishTemplateParams, RepoError, TemplateQueryFilter, TemplatesRepo, TemplatesWriteRepo,
};
use crate::domain::api_keys::ApiScope;
use crate::domain::error::DomainError;
use crate::domain::injection::InjectionKey;
use crate::domain::templates::{TemplateCoordinates, TemplateDefinition, validate_bindings};

#[derive(Debug, Error)]
pub enum TemplateAdminError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("template not found")]
    NotFound,
}

#[derive(Debug, Clone)]
pub struct PublishTemplateCommand {
    pub coordinates: TemplateCoordinates,
    pub body: String,
    pub placeholders: Vec<InjectionKey>,
    pub activate: bool,
}

#[derive(Clone)]
pub struct TemplateAdminService {
    reader: Arc<dyn TemplatesRepo>,
    writer: Arc<dyn TemplatesWriteRepo>,
    loader: CatalogLoader,
    catalog: CatalogHandle,
}

impl TemplateAdminService {
    pub fn new(
        reader: Arc<dyn TemplatesRepo>,
        writer: Arc<dyn TemplatesWriteRepo>,
        loader: CatalogLoader,
        catalog: CatalogHandle,
    ) -> Self {
        Self {
            reader,
            writer,
            loader,
            catalog,
        }
    }

    /// Stores the next version at the command's coordinates.
    pub async fn publish(
        &self,
        principal: &Principal,
        cmd: PublishTemplateCommand,
    ) -> Result<TemplateDefinition, TemplateAdminError> {
        principal.requires(ApiScope::TemplateWrite)?;
        cmd.coordinates.validate()?;
        authorize(principal, cmd.coordinates.tenant_code.as_deref())?;
        validate_bindings(&cmd.body, &cmd.placeholders)?;

        let template = self
            .writer
            .publish_template(PublishTemplateParams {
                coordinates: cmd.coordinates,
                body: cmd.body,
                placeholders: cmd.placeholders,
                activate: cmd.activate,
            })
            .await?;

        info!(
            target = "stampa::templates",
            template_id = %template.id,
            scope = %template.scope,
            document_type = %template.document_type_code,
            version = template.version,
            active = template.active,
            actor = %principal.name,
            "Template published"
        );

        if template.active {
            self.refresh_catalog().await;
        }
        Ok(template)
    }

    pub async fn set_active(
        &self,
        principal: &Principal,
        id: Uuid,
        active: bool,
    ) -> Result<TemplateDefinition, TemplateAdminError> {
        principal.requires(ApiScope::TemplateWrite)?;
        let existing = self
            .reader
            .find_template(id)
            .await?
            .ok_or(TemplateAdminError::NotFound)?;
        authorize(principal, existing.tenant_code.as_deref())?;

        let template = self.writer.set_template_active(id, active).await?;
        info!(
            target = "stampa::templates",
            template_id = %template.id,
            version = template.version,
            active = template.active,
            actor = %principal.name,
            "Template activation changed"
        );

        self.refresh_catalog().await;
        Ok(template)
    }

    /// Lists templates visible to the principal. Tenant-bound keys only see
    /// their own tenant's templates.
    pub async fn list(
        &self,
        principal: &Principal,
        mut filter: TemplateQueryFilter,
    ) -> Result<Vec<TemplateDefinition>, TemplateAdminError> {
        principal.requires(ApiScope::TemplateRead)?;
        if let Some(bound) = principal.tenant_code.as_deref() {
            if let Some(requested) = filter.tenant_code.as_deref() {
                principal.may_act_for(requested)?;
            }
            filter.tenant_code = Some(bound.to_string());
        }
        Ok(self.reader.list_templates(&filter).await?)
    }

    pub async fn reload(&self, principal: &Principal) -> Result<usize, TemplateAdminError> {
        principal.requires(ApiScope::TemplateWrite)?;
        Ok(self.loader.refresh(&self.catalog).await?)
    }

    async fn refresh_catalog(&self) {
        if let Err(err) = self.loader.refresh(&self.catalog).await {
            warn!(
                target = "stampa::templates",
                error = %err,
                "Catalog refresh after template change failed"
            );
        }
    }
}

/// Tenant templates need a key for that tenant; global ones need a system key.
fn authorize(principal: &Principal, tenant_code: Option<&str>) -> Result<(), AuthError> {
    match tenant_code {
        Some(tenant) => principal.may_act_for(tenant),
        None if principal.is_system() => Ok(()),
        None => Err(AuthError::Forbidden(
            "manage global templates".to_string(),
        )),
    }
}
