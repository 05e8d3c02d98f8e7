//! Document rendering endpoint.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;

use crate::application::render::{RenderRequest, RenderResult};
use crate::infra::http::api::middleware::credential;
use crate::infra::http::api::state::ApiState;

use super::render_failure_to_api;

pub const TEMPLATE_ID_HEADER: &str = "x-template-id";
pub const TEMPLATE_VERSION_HEADER: &str = "x-template-version";
pub const TEMPLATE_SCOPE_HEADER: &str = "x-template-scope";
pub const RENDERED_AT_HEADER: &str = "x-rendered-at";

pub async fn render_document(
    State(state): State<ApiState>,
    Path((tenant, workspace, document_type)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RenderRequest {
        tenant_code: tenant,
        workspace_code: workspace,
        document_type_code: document_type,
        body,
        credential: credential(&headers).unwrap_or_default(),
    };

    // Dropping this future (client went away) cancels the render.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match state.pipeline.render(&request, &cancel).await {
        Ok(result) => document_response(result),
        Err(failure) => render_failure_to_api(&failure).into_response(),
    }
}

fn document_response(result: RenderResult) -> Response {
    let mut response = Response::new(Body::from(result.document));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    insert_header(headers, header::CONTENT_TYPE, &result.content_type);
    insert_header(
        headers,
        HeaderName::from_static(TEMPLATE_ID_HEADER),
        &result.template_id.to_string(),
    );
    insert_header(
        headers,
        HeaderName::from_static(TEMPLATE_VERSION_HEADER),
        &result.template_version.to_string(),
    );
    insert_header(
        headers,
        HeaderName::from_static(TEMPLATE_SCOPE_HEADER),
        result.template_scope.as_str(),
    );
    if let Ok(rendered_at) = result.rendered_at.format(&Rfc3339) {
        insert_header(
            headers,
            HeaderName::from_static(RENDERED_AT_HEADER),
            &rendered_at,
        );
    }

    response
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
