//! Template lookup along the workspace → tenant system → global fallback chain.

use std::sync::Arc;

use crate::application::catalog::{CatalogHandle, TemplateCatalog};
use crate::domain::templates::{TemplateDefinition, TemplateScope};

/// The three coordinates a render request resolves a template by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupCoordinates<'a> {
    pub tenant_code: &'a str,
    pub workspace_code: &'a str,
    pub document_type_code: &'a str,
}

struct ResolutionStep {
    scope: TemplateScope,
    matches: fn(&TemplateDefinition, &LookupCoordinates<'_>, &TemplateCatalog) -> bool,
}

/// Ordered from most to least specific. The first step with a candidate wins.
const FALLBACK_CHAIN: [ResolutionStep; 3] = [
    ResolutionStep {
        scope: TemplateScope::Workspace,
        matches: in_requested_workspace,
    },
    ResolutionStep {
        scope: TemplateScope::TenantSystemWorkspace,
        matches: in_tenant_system_workspace,
    },
    ResolutionStep {
        scope: TemplateScope::GlobalSystem,
        matches: any_tenant,
    },
];

fn in_requested_workspace(
    template: &TemplateDefinition,
    query: &LookupCoordinates<'_>,
    _: &TemplateCatalog,
) -> bool {
    template.tenant_code.as_deref() == Some(query.tenant_code)
        && template.workspace_code.as_deref() == Some(query.workspace_code)
}

fn in_tenant_system_workspace(
    template: &TemplateDefinition,
    query: &LookupCoordinates<'_>,
    catalog: &TemplateCatalog,
) -> bool {
    template.tenant_code.as_deref() == Some(query.tenant_code)
        && template.workspace_code.as_deref()
            == Some(catalog.system_workspace_for(query.tenant_code))
}

fn any_tenant(_: &TemplateDefinition, _: &LookupCoordinates<'_>, _: &TemplateCatalog) -> bool {
    true
}

/// Returns the active template with the highest version at the most specific
/// scope that has one, or `None` when no scope does.
pub fn resolve(
    catalog: &TemplateCatalog,
    query: &LookupCoordinates<'_>,
) -> Option<Arc<TemplateDefinition>> {
    let candidates = catalog.candidates(query.document_type_code);

    FALLBACK_CHAIN.iter().find_map(|step| {
        candidates
            .iter()
            .filter(|template| {
                template.active
                    && template.scope == step.scope
                    && template.document_type_code == query.document_type_code
                    && (step.matches)(template, query, catalog)
            })
            .max_by_key(|template| template.version)
            .cloned()
    })
}

#[derive(Debug, Clone)]
pub struct TemplateResolver {
    catalog: CatalogHandle,
}

impl TemplateResolver {
    pub fn new(catalog: CatalogHandle) -> Self {
        Self { catalog }
    }

    pub fn resolve(&self, query: &LookupCoordinates<'_>) -> Option<Arc<TemplateDefinition>> {
        let snapshot = self.catalog.snapshot();
        resolve(&snapshot, query)
    }
}
