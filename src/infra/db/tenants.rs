use crate::application::repos::{RepoError, TenantsRepo};
use crate::domain::tenants::TenantRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    code: String,
    system_workspace_code: Option<String>,
}

impl From<TenantRow> for TenantRecord {
    fn from(row: TenantRow) -> Self {
        Self {
            code: row.code,
            system_workspace_code: row.system_workspace_code,
        }
    }
}

#[async_trait::async_trait]
impl TenantsRepo for PostgresRepositories {
    async fn list_tenants(&self) -> Result<Vec<TenantRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TenantRow>(
            "SELECT code, system_workspace_code FROM tenants ORDER BY code",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TenantRecord::from).collect())
    }

    async fn upsert_tenant(&self, tenant: &TenantRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO tenants (code, system_workspace_code) VALUES ($1, $2) \
             ON CONFLICT (code) DO UPDATE SET system_workspace_code = EXCLUDED.system_workspace_code",
        )
        .bind(&tenant.code)
        .bind(tenant.system_workspace_code.as_deref())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
