use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    PublishTemplateParams, RepoError, TemplateQueryFilter, TemplatesRepo, TemplatesWriteRepo,
};
use crate::domain::injection::InjectionKey;
use crate::domain::templates::{TemplateDefinition, TemplateScope};

use super::{PostgresRepositories, map_sqlx_error};

const TEMPLATE_COLUMNS: &str = "id, scope, tenant_code, workspace_code, document_type_code, \
    body, placeholders, active, version, created_at";

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    scope: String,
    tenant_code: Option<String>,
    workspace_code: Option<String>,
    document_type_code: String,
    body: String,
    placeholders: Vec<String>,
    active: bool,
    version: i32,
    created_at: OffsetDateTime,
}

impl TryFrom<TemplateRow> for TemplateDefinition {
    type Error = RepoError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let integrity = |message: String| RepoError::Integrity { message };

        let scope = row
            .scope
            .parse::<TemplateScope>()
            .map_err(|err| integrity(format!("template {}: {err}", row.id)))?;
        let placeholders = row
            .placeholders
            .iter()
            .map(|raw| raw.parse::<InjectionKey>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| integrity(format!("template {}: {err}", row.id)))?;

        Ok(TemplateDefinition {
            id: row.id,
            scope,
            tenant_code: row.tenant_code,
            workspace_code: row.workspace_code,
            document_type_code: row.document_type_code,
            body: row.body,
            placeholders,
            active: row.active,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

fn into_definitions(rows: Vec<TemplateRow>) -> Result<Vec<TemplateDefinition>, RepoError> {
    rows.into_iter().map(TemplateDefinition::try_from).collect()
}

#[async_trait::async_trait]
impl TemplatesRepo for PostgresRepositories {
    async fn list_templates(
        &self,
        filter: &TemplateQueryFilter,
    ) -> Result<Vec<TemplateDefinition>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE 1=1 "
        ));

        if let Some(scope) = filter.scope {
            qb.push(" AND scope = ");
            qb.push_bind(scope.as_str());
        }

        if let Some(tenant_code) = filter.tenant_code.as_ref() {
            qb.push(" AND tenant_code = ");
            qb.push_bind(tenant_code);
        }

        if let Some(workspace_code) = filter.workspace_code.as_ref() {
            qb.push(" AND workspace_code = ");
            qb.push_bind(workspace_code);
        }

        if let Some(document_type_code) = filter.document_type_code.as_ref() {
            qb.push(" AND document_type_code = ");
            qb.push_bind(document_type_code);
        }

        if let Some(active) = filter.active {
            qb.push(" AND active = ");
            qb.push_bind(active);
        }

        qb.push(
            " ORDER BY document_type_code, scope, tenant_code NULLS FIRST, \
             workspace_code NULLS FIRST, version DESC",
        );

        let rows = qb
            .build_query_as::<TemplateRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_definitions(rows)
    }

    async fn load_active_templates(&self) -> Result<Vec<TemplateDefinition>, RepoError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE active");
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_definitions(rows)
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<TemplateDefinition>, RepoError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1");
        sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(TemplateDefinition::try_from)
            .transpose()
    }
}

#[async_trait::async_trait]
impl TemplatesWriteRepo for PostgresRepositories {
    async fn publish_template(
        &self,
        params: PublishTemplateParams,
    ) -> Result<TemplateDefinition, RepoError> {
        let coords = &params.coordinates;
        let lock_key = format!(
            "templates:{}:{}:{}:{}",
            coords.scope,
            coords.tenant_code.as_deref().unwrap_or(""),
            coords.workspace_code.as_deref().unwrap_or(""),
            coords.document_type_code
        );
        let placeholders: Vec<String> = params
            .placeholders
            .iter()
            .map(ToString::to_string)
            .collect();

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // Serialises concurrent publishes at the same coordinates.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&lock_key)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM templates \
             WHERE scope = $1 \
               AND tenant_code IS NOT DISTINCT FROM $2 \
               AND workspace_code IS NOT DISTINCT FROM $3 \
               AND document_type_code = $4",
        )
        .bind(coords.scope.as_str())
        .bind(coords.tenant_code.as_deref())
        .bind(coords.workspace_code.as_deref())
        .bind(&coords.document_type_code)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO templates (id, scope, tenant_code, workspace_code, document_type_code, \
             body, placeholders, active, version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {TEMPLATE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(coords.scope.as_str())
            .bind(coords.tenant_code.as_deref())
            .bind(coords.workspace_code.as_deref())
            .bind(&coords.document_type_code)
            .bind(&params.body)
            .bind(placeholders)
            .bind(params.activate)
            .bind(version)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        TemplateDefinition::try_from(row)
    }

    async fn set_template_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<TemplateDefinition, RepoError> {
        let sql = format!(
            "UPDATE templates SET active = $2 WHERE id = $1 RETURNING {TEMPLATE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        TemplateDefinition::try_from(row)
    }
}
