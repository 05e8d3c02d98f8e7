//! Injectors that read the request's own coordinates.

use async_trait::async_trait;

use crate::application::engine::{
    InjectionContext, Injector, InjectorError, RegistrationError, RenderEngineBuilder,
};
use crate::domain::injection::{InjectedValue, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    TenantCode,
    WorkspaceCode,
    DocumentType,
    RenderedAt,
}

impl ContextField {
    const ALL: [ContextField; 4] = [
        Self::TenantCode,
        Self::WorkspaceCode,
        Self::DocumentType,
        Self::RenderedAt,
    ];

    fn key(self) -> (ValueType, &'static str) {
        match self {
            Self::TenantCode => (ValueType::String, "tenant_code"),
            Self::WorkspaceCode => (ValueType::String, "workspace_code"),
            Self::DocumentType => (ValueType::String, "document_type"),
            Self::RenderedAt => (ValueType::Time, "rendered_at"),
        }
    }
}

pub struct ContextInjector {
    field: ContextField,
}

impl ContextInjector {
    pub fn new(field: ContextField) -> Self {
        Self { field }
    }
}

#[async_trait]
impl Injector for ContextInjector {
    async fn inject(&self, ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        Ok(match self.field {
            ContextField::TenantCode => InjectedValue::String(ctx.tenant_code.to_string()),
            ContextField::WorkspaceCode => InjectedValue::String(ctx.workspace_code.to_string()),
            ContextField::DocumentType => {
                InjectedValue::String(ctx.document_type_code.to_string())
            }
            ContextField::RenderedAt => InjectedValue::Time(ctx.rendered_at),
        })
    }
}

/// Registers `string:tenant_code`, `string:workspace_code`,
/// `string:document_type` and `time:rendered_at`.
pub fn register(builder: &mut RenderEngineBuilder) -> Result<(), RegistrationError> {
    for field in ContextField::ALL {
        let (value_type, name) = field.key();
        builder.register_injector(value_type, name, ContextInjector::new(field))?;
    }
    Ok(())
}
