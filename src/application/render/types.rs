use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::auth::AuthError;
use crate::application::engine::{InjectionFailure, InjectorError, MapperError, MappingFailure};
use crate::domain::injection::{InjectedValue, InjectionKey};
use crate::domain::templates::{TemplateDefinition, TemplateScope};

/// The pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    Auth,
    Mapping,
    Resolution,
    Injection,
    Render,
}

impl RenderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Mapping => "mapping",
            Self::Resolution => "resolution",
            Self::Injection => "injection",
            Self::Render => "render",
        }
    }
}

impl Display for RenderStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Received,
    Authenticated,
    Mapped,
    Resolved,
    Injected,
    Rendered,
    Completed,
    Failed(RenderStage),
}

impl RenderState {
    /// The stage that runs next from this state, if any.
    pub fn pending_stage(self) -> Option<RenderStage> {
        match self {
            Self::Received => Some(RenderStage::Auth),
            Self::Authenticated => Some(RenderStage::Mapping),
            Self::Mapped => Some(RenderStage::Resolution),
            Self::Resolved => Some(RenderStage::Injection),
            Self::Injected => Some(RenderStage::Render),
            Self::Rendered | Self::Completed | Self::Failed(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub tenant_code: String,
    pub workspace_code: String,
    pub document_type_code: String,
    pub body: Bytes,
    /// Bearer credential presented by the caller.
    pub credential: String,
}

#[derive(Debug, Clone)]
pub struct RenderResult {
    pub document: Bytes,
    pub content_type: String,
    pub template_id: Uuid,
    pub template_version: i32,
    pub template_scope: TemplateScope,
    pub rendered_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Caller,
    /// The request deadline elapsed.
    Deadline,
}

#[derive(Debug, Error)]
pub enum RenderCause {
    #[error("credential rejected")]
    Unauthorized(#[source] AuthError),
    #[error("credential verification timed out")]
    AuthTimeout,
    #[error("no mapper is registered for document type `{document_type}`")]
    UnknownMapper { document_type: String },
    #[error("payload rejected")]
    PayloadValidation(#[source] MapperError),
    #[error("mapper for document type `{document_type}` panicked")]
    MapperPanicked { document_type: String },
    #[error(
        "no active template for tenant `{tenant}`, workspace `{workspace}`, document type `{document_type}`"
    )]
    TemplateNotFound {
        tenant: String,
        workspace: String,
        document_type: String,
    },
    #[error("no injector is registered for `{key}`")]
    UnknownInjector { key: InjectionKey },
    #[error("injector for `{key}` failed")]
    InjectorExecution {
        key: InjectionKey,
        #[source]
        source: InjectorError,
    },
    #[error("render cancelled ({reason:?})")]
    Cancelled { reason: CancelReason },
    #[error("document rendering failed")]
    Render(#[source] RenderError),
}

/// Coarse grouping of causes used to pick caller-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    BadRequest,
    NotConfigured,
    Transient,
    Unauthorized,
    Internal,
}

impl RenderCause {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::AuthTimeout => "auth_timeout",
            Self::UnknownMapper { .. } => "unknown_mapper",
            Self::PayloadValidation(_) => "payload_validation",
            Self::MapperPanicked { .. } => "mapper_panicked",
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::UnknownInjector { .. } => "unknown_injector",
            Self::InjectorExecution { .. } => "injector_execution",
            Self::Cancelled {
                reason: CancelReason::Caller,
            } => "cancelled",
            Self::Cancelled {
                reason: CancelReason::Deadline,
            } => "timed_out",
            Self::Render(_) => "render_failed",
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Unauthorized(_) => FailureClass::Unauthorized,
            Self::PayloadValidation(_) => FailureClass::BadRequest,
            Self::UnknownMapper { .. }
            | Self::TemplateNotFound { .. }
            | Self::UnknownInjector { .. } => FailureClass::NotConfigured,
            Self::AuthTimeout
            | Self::Cancelled { .. }
            | Self::InjectorExecution {
                source: InjectorError::Timeout(_),
                ..
            } => FailureClass::Transient,
            Self::MapperPanicked { .. } | Self::InjectorExecution { .. } | Self::Render(_) => {
                FailureClass::Internal
            }
        }
    }
}

impl From<MappingFailure> for RenderCause {
    fn from(failure: MappingFailure) -> Self {
        match failure {
            MappingFailure::UnknownMapper { document_type } => {
                Self::UnknownMapper { document_type }
            }
            MappingFailure::PayloadValidation { source, .. } => Self::PayloadValidation(source),
        }
    }
}

impl From<InjectionFailure> for RenderCause {
    fn from(failure: InjectionFailure) -> Self {
        match failure {
            InjectionFailure::UnknownInjector { key } => Self::UnknownInjector { key },
            InjectionFailure::Execution { key, source } => Self::InjectorExecution { key, source },
            InjectionFailure::Cancelled => Self::Cancelled {
                reason: CancelReason::Caller,
            },
        }
    }
}

/// Terminal failure of a render, tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("render failed during {stage} stage")]
pub struct RenderFailure {
    pub stage: RenderStage,
    #[source]
    pub cause: RenderCause,
}

impl RenderFailure {
    pub fn new(stage: RenderStage, cause: RenderCause) -> Self {
        Self { stage, cause }
    }

    pub fn class(&self) -> FailureClass {
        self.cause.class()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("no value was produced for placeholder `{name}`")]
    MissingValue { name: String },
    #[error("value for placeholder `{name}` could not be formatted: {message}")]
    Value { name: String, message: String },
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("document renderer panicked")]
    Panicked,
}

/// Turns a template and its resolved values into document bytes.
///
/// Implementations must be pure: the same inputs give the same output.
pub trait DocumentRenderer: Send + Sync {
    fn render(
        &self,
        template: &TemplateDefinition,
        values: &HashMap<InjectionKey, InjectedValue>,
    ) -> Result<RenderedDocument, RenderError>;
}
