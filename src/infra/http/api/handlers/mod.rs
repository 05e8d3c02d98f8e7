//! API handlers grouped by resource.
//!
//! Error conversions shared by the groups live here.

mod render;
mod templates;

pub use render::*;
pub use templates::*;

use axum::http::StatusCode;

use crate::application::auth::AuthError;
use crate::application::engine::{InjectorError, MapperError};
use crate::application::render::{CancelReason, RenderCause, RenderFailure};
use crate::application::repos::RepoError;
use crate::application::templates::TemplateAdminError;

use super::error::{ApiError, codes};
use super::middleware::auth_error_to_api;

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(message),
        ),
    }
}

pub(crate) fn template_admin_to_api(err: TemplateAdminError) -> ApiError {
    match err {
        TemplateAdminError::Domain(domain) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid template",
            Some(domain.to_string()),
        ),
        TemplateAdminError::Repo(repo) => repo_to_api(repo),
        TemplateAdminError::Auth(auth) => auth_error_to_api(auth),
        TemplateAdminError::NotFound => ApiError::not_found("template not found"),
    }
}

/// Maps a render failure onto a status, keeping the stage and cause code.
pub(crate) fn render_failure_to_api(failure: &RenderFailure) -> ApiError {
    let (status, message) = match &failure.cause {
        RenderCause::Unauthorized(AuthError::Forbidden(_)) => {
            (StatusCode::FORBIDDEN, "Credential may not render this document")
        }
        RenderCause::Unauthorized(AuthError::Unavailable) => {
            (StatusCode::SERVICE_UNAVAILABLE, "Credential store unavailable")
        }
        RenderCause::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Credential rejected"),
        RenderCause::AuthTimeout => (
            StatusCode::GATEWAY_TIMEOUT,
            "Credential verification timed out",
        ),
        RenderCause::UnknownMapper { .. } => (
            StatusCode::NOT_FOUND,
            "Document type is not configured",
        ),
        RenderCause::PayloadValidation(MapperError::Parse(_)) => {
            (StatusCode::BAD_REQUEST, "Payload could not be parsed")
        }
        RenderCause::PayloadValidation(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Payload failed validation",
        ),
        RenderCause::MapperPanicked { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Payload mapper failed")
        }
        RenderCause::TemplateNotFound { .. } => {
            (StatusCode::NOT_FOUND, "No active template found")
        }
        RenderCause::UnknownInjector { .. } => (
            StatusCode::NOT_IMPLEMENTED,
            "Template placeholder has no injector",
        ),
        RenderCause::InjectorExecution {
            source: InjectorError::Timeout(_),
            ..
        } => (StatusCode::GATEWAY_TIMEOUT, "Injector timed out"),
        RenderCause::InjectorExecution { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Injector failed")
        }
        RenderCause::Cancelled {
            reason: CancelReason::Deadline,
        } => (StatusCode::GATEWAY_TIMEOUT, "Render timed out"),
        RenderCause::Cancelled {
            reason: CancelReason::Caller,
        } => (StatusCode::SERVICE_UNAVAILABLE, "Render cancelled"),
        RenderCause::Render(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Document rendering failed",
        ),
    };

    ApiError::new(status, failure.cause.code(), message, Some(error_chain(&failure.cause)))
        .with_stage(failure.stage.as_str())
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(inner) = current {
        parts.push(inner.to_string());
        current = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::render::RenderStage;

    #[test]
    fn render_failures_map_to_class_statuses() {
        let cases = [
            (
                RenderFailure::new(
                    RenderStage::Auth,
                    RenderCause::Unauthorized(AuthError::Invalid),
                ),
                StatusCode::UNAUTHORIZED,
            ),
            (
                RenderFailure::new(
                    RenderStage::Mapping,
                    RenderCause::PayloadValidation(MapperError::validation("total missing")),
                ),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                RenderFailure::new(
                    RenderStage::Resolution,
                    RenderCause::TemplateNotFound {
                        tenant: "acme".into(),
                        workspace: "sales".into(),
                        document_type: "invoice".into(),
                    },
                ),
                StatusCode::NOT_FOUND,
            ),
            (
                RenderFailure::new(
                    RenderStage::Injection,
                    RenderCause::UnknownInjector {
                        key: "table:lines".parse().unwrap(),
                    },
                ),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                RenderFailure::new(
                    RenderStage::Injection,
                    RenderCause::InjectorExecution {
                        key: "string:rate".parse().unwrap(),
                        source: InjectorError::Timeout(Duration::from_secs(1)),
                    },
                ),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];

        for (failure, status) in cases {
            let api = render_failure_to_api(&failure);
            assert_eq!(api.status(), status, "{failure:?}");
            assert_eq!(api.code(), failure.cause.code());
        }
    }

    #[test]
    fn hint_carries_the_cause_chain() {
        let failure = RenderFailure::new(
            RenderStage::Injection,
            RenderCause::InjectorExecution {
                key: "string:rate".parse().unwrap(),
                source: InjectorError::failed("upstream down"),
            },
        );
        let chain = error_chain(&failure.cause);
        assert!(chain.contains("string:rate"));
        assert!(chain.contains("upstream down"));
    }
}
