use std::sync::Arc;

use sqlx::PgPool;

use stampa::application::api_keys::{ApiKeyService, IssueApiKeyCommand};
use stampa::application::auth::AuthError;
use stampa::application::catalog::{CatalogHandle, CatalogLoader};
use stampa::application::migrations::MigrationRunner;
use stampa::application::repos::{
    PublishTemplateParams, TemplatesRepo, TemplatesWriteRepo, TenantsRepo,
};
use stampa::application::resolver::{LookupCoordinates, TemplateResolver};
use stampa::domain::api_keys::ApiScope;
use stampa::domain::templates::{TemplateCoordinates, TemplateScope};
use stampa::domain::tenants::TenantRecord;
use stampa::infra::db::PostgresRepositories;
use stampa::infra::migrations::PostgresMigrationRunner;

fn workspace_invoice(body: &str, activate: bool) -> PublishTemplateParams {
    PublishTemplateParams {
        coordinates: TemplateCoordinates {
            scope: TemplateScope::Workspace,
            tenant_code: Some("acme".to_string()),
            workspace_code: Some("sales".to_string()),
            document_type_code: "invoice".to_string(),
        },
        body: body.to_string(),
        placeholders: vec!["string:customer".parse().expect("valid key")],
        activate,
    }
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn migrations_apply_once(pool: PgPool) {
    let runner = PostgresMigrationRunner::new(pool);

    let first = runner.run_migrations().await.expect("first run");
    assert_eq!(first.applied.len(), 3);

    let second = runner.run_migrations().await.expect("second run");
    assert!(second.is_noop());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn publishing_assigns_increasing_versions(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let first = repos
        .publish_template(workspace_invoice("v1 {{ customer }}", true))
        .await
        .expect("publish v1");
    let second = repos
        .publish_template(workspace_invoice("v2 {{ customer }}", false))
        .await
        .expect("publish v2");

    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert!(!second.active);

    let active = repos.load_active_templates().await.expect("active templates");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);

    let activated = repos
        .set_template_active(second.id, true)
        .await
        .expect("activate v2");
    assert!(activated.active);
    assert_eq!(
        repos.find_template(second.id).await.expect("find").map(|t| t.version),
        Some(2)
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn catalog_loads_tenant_system_workspace(pool: PgPool) {
    let repos = Arc::new(PostgresRepositories::new(pool));
    repos
        .upsert_tenant(&TenantRecord {
            code: "acme".to_string(),
            system_workspace_code: Some("house".to_string()),
        })
        .await
        .expect("upsert tenant");
    repos
        .publish_template(PublishTemplateParams {
            coordinates: TemplateCoordinates {
                scope: TemplateScope::TenantSystemWorkspace,
                tenant_code: Some("acme".to_string()),
                workspace_code: Some("house".to_string()),
                document_type_code: "invoice".to_string(),
            },
            body: "house".to_string(),
            placeholders: Vec::new(),
            activate: true,
        })
        .await
        .expect("publish");

    let handle = CatalogHandle::default();
    let loader = CatalogLoader::new(repos.clone(), repos, "system");
    assert_eq!(loader.refresh(&handle).await.expect("refresh"), 1);

    let resolved = TemplateResolver::new(handle)
        .resolve(&LookupCoordinates {
            tenant_code: "acme",
            workspace_code: "sales",
            document_type_code: "invoice",
        })
        .expect("system workspace template");
    assert_eq!(resolved.scope, TemplateScope::TenantSystemWorkspace);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn issued_keys_authenticate_until_revoked(pool: PgPool) {
    let service = ApiKeyService::new(Arc::new(PostgresRepositories::new(pool)));

    let issued = service
        .issue(IssueApiKeyCommand {
            name: "ci".to_string(),
            tenant_code: Some("acme".to_string()),
            scopes: vec![ApiScope::Render],
            expires_at: None,
        })
        .await
        .expect("issue key");

    let principal = service.authenticate(&issued.token).await.expect("valid key");
    assert_eq!(principal.tenant_code.as_deref(), Some("acme"));
    assert_eq!(principal.scopes, vec![ApiScope::Render]);

    service.revoke(issued.record.id).await.expect("revoke");
    assert_eq!(
        service.authenticate(&issued.token).await,
        Err(AuthError::Revoked)
    );
}
