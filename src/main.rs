use std::{process, sync::Arc, time::Duration};

use stampa::{
    application::{
        api_keys::{ApiKeyService, IssueApiKeyCommand},
        auth::AuthVerifier,
        catalog::{CatalogHandle, CatalogLoader},
        engine::RenderEngineBuilder,
        error::AppError,
        migrations::MigrationRunner,
        render::{ComrakDocumentRenderer, RenderPipeline, RenderPipelineConfig},
        repos::{ApiKeysRepo, HealthRepo, TemplatesRepo, TemplatesWriteRepo, TenantsRepo},
        resolver::TemplateResolver,
        templates::TemplateAdminService,
    },
    config,
    domain::{api_keys::ApiScope, templates::validate_code, tenants::TenantRecord},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState},
        migrations::PostgresMigrationRunner,
        telemetry,
    },
    plugins,
};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Keys(args) => match args.command {
            config::KeysCommand::Issue(issue) => run_issue_key(settings, issue).await,
        },
        config::Command::Tenants(args) => match args.command {
            config::TenantsCommand::SetSystemWorkspace(set) => {
                run_set_system_workspace(settings, set).await
            }
        },
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn apply_migrations(repositories: &PostgresRepositories) -> Result<(), AppError> {
    let runner = PostgresMigrationRunner::new(repositories.pool().clone());
    let report = runner.run_migrations().await?;
    if !report.is_noop() {
        info!(applied = ?report.applied, "schema migrated");
    }
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let runner = PostgresMigrationRunner::new(repositories.pool().clone());
    let report = runner.run_migrations().await?;

    if report.is_noop() {
        println!("Schema is up to date");
    } else {
        println!("Applied {} migration(s): {:?}", report.applied.len(), report.applied);
    }
    Ok(())
}

async fn run_issue_key(
    settings: config::Settings,
    args: config::IssueKeyArgs,
) -> Result<(), AppError> {
    let scopes = args
        .scopes
        .iter()
        .map(|raw| {
            raw.trim()
                .parse::<ApiScope>()
                .map_err(|()| AppError::validation(format!("unknown scope `{raw}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let expires_at = args
        .expires_in_days
        .map(|days| OffsetDateTime::now_utc() + time::Duration::days(i64::from(days)));

    let repositories = init_repositories(&settings).await?;
    apply_migrations(&repositories).await?;

    let keys_repo: Arc<dyn ApiKeysRepo> = repositories;
    let issued = ApiKeyService::new(keys_repo)
        .issue(IssueApiKeyCommand {
            name: args.name,
            tenant_code: args.tenant,
            scopes,
            expires_at,
        })
        .await?;

    println!("id:     {}", issued.record.id);
    println!("prefix: {}", issued.record.prefix);
    println!("token:  {}", issued.token);
    println!("The token is shown once; store it now.");
    Ok(())
}

async fn run_set_system_workspace(
    settings: config::Settings,
    args: config::SetSystemWorkspaceArgs,
) -> Result<(), AppError> {
    validate_code("tenant", &args.tenant)?;
    if let Some(workspace) = args.workspace.as_deref() {
        validate_code("workspace", workspace)?;
    }

    let repositories = init_repositories(&settings).await?;
    apply_migrations(&repositories).await?;

    repositories
        .upsert_tenant(&TenantRecord {
            code: args.tenant.clone(),
            system_workspace_code: args.workspace.clone(),
        })
        .await?;

    match args.workspace {
        Some(workspace) => println!("tenant {}: system workspace set to {workspace}", args.tenant),
        None => println!(
            "tenant {}: system workspace cleared; using `{}`",
            args.tenant, settings.resolver.default_system_workspace
        ),
    }
    println!("Running services pick this up on their next catalog refresh.");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    // Refuse to serve against an unmigrated schema.
    apply_migrations(&repositories).await?;

    let templates_repo: Arc<dyn TemplatesRepo> = repositories.clone();
    let templates_write_repo: Arc<dyn TemplatesWriteRepo> = repositories.clone();
    let tenants_repo: Arc<dyn TenantsRepo> = repositories.clone();
    let keys_repo: Arc<dyn ApiKeysRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories.clone();

    let catalog = CatalogHandle::default();
    let loader = CatalogLoader::new(
        templates_repo.clone(),
        tenants_repo,
        settings.resolver.default_system_workspace.clone(),
    );
    loader.refresh(&catalog).await?;

    let mut builder = RenderEngineBuilder::new();
    plugins::install(&mut builder, &settings.plugins)?;
    let engine = builder.build()?;

    let auth: Arc<dyn AuthVerifier> = Arc::new(ApiKeyService::new(keys_repo));
    let pipeline = RenderPipeline::new(
        auth.clone(),
        engine,
        TemplateResolver::new(catalog.clone()),
        Arc::new(ComrakDocumentRenderer::new()),
        RenderPipelineConfig::from(&settings.render),
    );
    let templates = TemplateAdminService::new(
        templates_repo,
        templates_write_repo,
        loader.clone(),
        catalog.clone(),
    );
    let rate_limiter = ApiRateLimiter::new(
        Duration::from_secs(u64::from(settings.api_rate_limit.window_seconds.get())),
        settings.api_rate_limit.max_requests.get(),
    );

    let state = ApiState {
        pipeline: Arc::new(pipeline),
        templates: Arc::new(templates),
        auth,
        health: health_repo,
        rate_limiter: Arc::new(rate_limiter),
    };

    let shutdown = CancellationToken::new();
    let refresher = settings
        .resolver
        .refresh_interval
        .map(|interval| spawn_catalog_refresher(loader, catalog, interval, shutdown.clone()));

    let result = serve_http(&settings, state, shutdown.clone()).await;

    shutdown.cancel();
    if let Some(handle) = refresher {
        let _ = handle.await;
    }

    result
}

fn spawn_catalog_refresher(
    loader: CatalogLoader,
    catalog: CatalogHandle,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = loader.refresh(&catalog).await {
                        warn!(error = %err, "periodic catalog refresh failed; keeping previous snapshot");
                    }
                }
            }
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        signal_token.cancel();
    });

    let drain_token = shutdown.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { drain_token.cancelled().await });

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "graceful shutdown timed out; dropping connections");
        }
    }

    Ok(())
}
