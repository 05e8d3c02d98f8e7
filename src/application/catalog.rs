//! In-memory snapshot of the active template catalog.
//!
//! Resolution runs against an immutable [`TemplateCatalog`]; reloading builds a
//! fresh snapshot and swaps it into the [`CatalogHandle`] so in-flight renders
//! keep the snapshot they started with.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, instrument};

use crate::application::repos::{RepoError, TemplatesRepo, TenantsRepo};
use crate::domain::templates::TemplateDefinition;
use crate::domain::tenants::TenantRecord;

#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    by_document_type: HashMap<String, Vec<Arc<TemplateDefinition>>>,
    system_workspaces: HashMap<String, String>,
    default_system_workspace: String,
}

impl TemplateCatalog {
    pub fn new(
        templates: Vec<TemplateDefinition>,
        tenants: Vec<TenantRecord>,
        default_system_workspace: impl Into<String>,
    ) -> Self {
        let mut by_document_type: HashMap<String, Vec<Arc<TemplateDefinition>>> = HashMap::new();
        for template in templates {
            by_document_type
                .entry(template.document_type_code.clone())
                .or_default()
                .push(Arc::new(template));
        }

        let system_workspaces = tenants
            .into_iter()
            .filter_map(|tenant| {
                tenant
                    .system_workspace_code
                    .map(|workspace| (tenant.code, workspace))
            })
            .collect();

        Self {
            by_document_type,
            system_workspaces,
            default_system_workspace: default_system_workspace.into(),
        }
    }

    /// Templates published for a document type, in no particular order.
    pub fn candidates(&self, document_type_code: &str) -> &[Arc<TemplateDefinition>] {
        self.by_document_type
            .get(document_type_code)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The workspace designated as the tenant's system workspace.
    pub fn system_workspace_for(&self, tenant_code: &str) -> &str {
        self.system_workspaces
            .get(tenant_code)
            .map(String::as_str)
            .unwrap_or(self.default_system_workspace.as_str())
    }

    pub fn template_count(&self) -> usize {
        self.by_document_type.values().map(Vec::len).sum()
    }
}

/// Shared, swappable reference to the current catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<TemplateCatalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub fn snapshot(&self) -> Arc<TemplateCatalog> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, catalog: TemplateCatalog) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(catalog);
    }
}

/// Builds catalog snapshots from the repositories.
#[derive(Clone)]
pub struct CatalogLoader {
    templates: Arc<dyn TemplatesRepo>,
    tenants: Arc<dyn TenantsRepo>,
    default_system_workspace: String,
}

impl CatalogLoader {
    pub fn new(
        templates: Arc<dyn TemplatesRepo>,
        tenants: Arc<dyn TenantsRepo>,
        default_system_workspace: impl Into<String>,
    ) -> Self {
        Self {
            templates,
            tenants,
            default_system_workspace: default_system_workspace.into(),
        }
    }

    pub async fn load(&self) -> Result<TemplateCatalog, RepoError> {
        let templates = self.templates.load_active_templates().await?;
        let tenants = self.tenants.list_tenants().await?;
        Ok(TemplateCatalog::new(
            templates,
            tenants,
            self.default_system_workspace.clone(),
        ))
    }

    /// Loads a fresh snapshot and installs it into `handle`.
    ///
    /// On error the previous snapshot stays in place.
    #[instrument(skip_all)]
    pub async fn refresh(&self, handle: &CatalogHandle) -> Result<usize, RepoError> {
        let catalog = self.load().await?;
        let count = catalog.template_count();
        handle.replace(catalog);
        metrics::gauge!("stampa_catalog_templates").set(count as f64);
        info!(target = "stampa::catalog", templates = count, "Template catalog refreshed");
        Ok(count)
    }
}
