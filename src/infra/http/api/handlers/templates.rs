//! Template administration endpoints.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::auth::Principal;
use crate::application::repos::TemplateQueryFilter;
use crate::application::templates::PublishTemplateCommand;
use crate::domain::templates::TemplateCoordinates;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{
    CatalogReloadResponse, TemplateActivationRequest, TemplateListQuery, TemplateListResponse,
    TemplatePublishRequest, TemplateResponse,
};
use crate::infra::http::api::state::ApiState;

use super::template_admin_to_api;

pub async fn list_templates(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<TemplateListQuery>,
) -> Result<Json<TemplateListResponse>, ApiError> {
    let filter = TemplateQueryFilter {
        scope: query.scope,
        tenant_code: query.tenant,
        workspace_code: query.workspace,
        document_type_code: query.document_type,
        active: query.active,
    };

    let items = state
        .templates
        .list(&principal, filter)
        .await
        .map_err(template_admin_to_api)?
        .into_iter()
        .map(TemplateResponse::from)
        .collect();

    Ok(Json(TemplateListResponse { items }))
}

pub async fn publish_template(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<TemplatePublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = PublishTemplateCommand {
        coordinates: TemplateCoordinates {
            scope: payload.scope,
            tenant_code: payload.tenant_code,
            workspace_code: payload.workspace_code,
            document_type_code: payload.document_type_code,
        },
        body: payload.body,
        placeholders: payload.placeholders,
        activate: payload.activate,
    };

    let template = state
        .templates
        .publish(&principal, command)
        .await
        .map_err(template_admin_to_api)?;

    Ok((StatusCode::CREATED, Json(TemplateResponse::from(template))))
}

pub async fn set_template_activation(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TemplateActivationRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = state
        .templates
        .set_active(&principal, id, payload.active)
        .await
        .map_err(template_admin_to_api)?;

    Ok(Json(TemplateResponse::from(template)))
}

pub async fn reload_templates(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<CatalogReloadResponse>, ApiError> {
    let templates = state
        .templates
        .reload(&principal)
        .await
        .map_err(template_admin_to_api)?;

    Ok(Json(CatalogReloadResponse { templates }))
}
