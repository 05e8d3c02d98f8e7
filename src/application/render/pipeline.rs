use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::context::RenderContext;
use super::types::{
    CancelReason, DocumentRenderer, RenderCause, RenderError, RenderFailure, RenderRequest,
    RenderResult, RenderStage,
};
use crate::application::auth::{AuthVerifier, Principal};
use crate::application::engine::{
    InjectionContext, InjectionFailure, InjectorError, MapperContext, RenderEngine,
};
use crate::application::resolver::{LookupCoordinates, TemplateResolver};
use crate::domain::api_keys::ApiScope;
use crate::domain::injection::{InjectedValue, InjectionKey};
use crate::domain::templates::TemplateDefinition;

const METRIC_RENDER_TOTAL: &str = "stampa_render_total";
const METRIC_RENDER_MS: &str = "stampa_render_ms";

#[derive(Debug, Clone)]
pub struct RenderPipelineConfig {
    pub auth_timeout: Duration,
    pub injector_timeout: Duration,
    pub request_timeout: Duration,
    pub injector_concurrency: usize,
}

impl Default for RenderPipelineConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(2),
            injector_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            injector_concurrency: 8,
        }
    }
}

impl From<&crate::config::RenderSettings> for RenderPipelineConfig {
    fn from(settings: &crate::config::RenderSettings) -> Self {
        Self {
            auth_timeout: settings.auth_timeout,
            injector_timeout: settings.injector_timeout,
            request_timeout: settings.request_timeout,
            injector_concurrency: settings.injector_concurrency,
        }
    }
}

/// Drives one request through auth, mapping, resolution, injection and
/// rendering.
///
/// Every failure is reported as a [`RenderFailure`] tagged with the stage it
/// happened in. Nothing is retried.
#[derive(Clone)]
pub struct RenderPipeline {
    auth: Arc<dyn AuthVerifier>,
    engine: RenderEngine,
    resolver: TemplateResolver,
    renderer: Arc<dyn DocumentRenderer>,
    config: RenderPipelineConfig,
}

impl RenderPipeline {
    pub fn new(
        auth: Arc<dyn AuthVerifier>,
        engine: RenderEngine,
        resolver: TemplateResolver,
        renderer: Arc<dyn DocumentRenderer>,
        config: RenderPipelineConfig,
    ) -> Self {
        Self {
            auth,
            engine,
            resolver,
            renderer,
            config,
        }
    }

    #[instrument(
        skip_all,
        fields(
            tenant = %request.tenant_code,
            workspace = %request.workspace_code,
            document_type = %request.document_type_code,
        )
    )]
    pub async fn render(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderResult, RenderFailure> {
        let started_at = std::time::Instant::now();
        let deadline = Instant::now() + self.config.request_timeout;
        let mut ctx = RenderContext::new(request);

        let outcome = self.run(&mut ctx, cancel, deadline).await;
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;

        match &outcome {
            Ok(result) => {
                counter!(METRIC_RENDER_TOTAL, "outcome" => "completed", "stage" => "none")
                    .increment(1);
                info!(
                    target = "stampa::render",
                    key_id = ?ctx.principal.as_ref().map(|principal| principal.key_id),
                    template_id = %result.template_id,
                    template_version = result.template_version,
                    template_scope = %result.template_scope,
                    bytes = result.document.len(),
                    elapsed_ms = elapsed_ms as u64,
                    "Document rendered"
                );
            }
            Err(failure) => {
                ctx.failed(failure.stage);
                counter!(
                    METRIC_RENDER_TOTAL,
                    "outcome" => "failed",
                    "stage" => failure.stage.as_str()
                )
                .increment(1);
                warn!(
                    target = "stampa::render",
                    key_id = ?ctx.principal.as_ref().map(|principal| principal.key_id),
                    template_id = ?ctx.template.as_ref().map(|template| template.id),
                    stage = %failure.stage,
                    code = failure.cause.code(),
                    error = %failure.cause,
                    elapsed_ms = elapsed_ms as u64,
                    "Render failed"
                );
            }
        }
        histogram!(METRIC_RENDER_MS).record(elapsed_ms);

        outcome
    }

    async fn run(
        &self,
        ctx: &mut RenderContext<'_>,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<RenderResult, RenderFailure> {
        let request = ctx.request;

        let principal = guard(
            RenderStage::Auth,
            cancel,
            deadline,
            self.authenticate(request),
        )
        .await?;
        ctx.authenticated(principal);

        checkpoint(ctx.current_stage(), cancel, deadline)?;
        let mapper_ctx = MapperContext {
            tenant_code: &request.tenant_code,
            workspace_code: &request.workspace_code,
            document_type_code: &request.document_type_code,
            shared: self.engine.shared(),
        };
        let mapped = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.mappers().map(&mapper_ctx, &request.body)
        }))
        .map_err(|_| {
            RenderFailure::new(
                RenderStage::Mapping,
                RenderCause::MapperPanicked {
                    document_type: request.document_type_code.clone(),
                },
            )
        })?
        .map_err(|failure| RenderFailure::new(RenderStage::Mapping, failure.into()))?;
        ctx.mapped(mapped);

        checkpoint(ctx.current_stage(), cancel, deadline)?;
        let template = self
            .resolver
            .resolve(&LookupCoordinates {
                tenant_code: &request.tenant_code,
                workspace_code: &request.workspace_code,
                document_type_code: &request.document_type_code,
            })
            .ok_or_else(|| {
                RenderFailure::new(
                    RenderStage::Resolution,
                    RenderCause::TemplateNotFound {
                        tenant: request.tenant_code.clone(),
                        workspace: request.workspace_code.clone(),
                        document_type: request.document_type_code.clone(),
                    },
                )
            })?;
        ctx.resolved(Arc::clone(&template));

        let values = guard(
            RenderStage::Injection,
            cancel,
            deadline,
            self.inject(ctx, &template, cancel),
        )
        .await?;
        ctx.injected(values);

        checkpoint(ctx.current_stage(), cancel, deadline)?;
        let document = panic::catch_unwind(AssertUnwindSafe(|| {
            self.renderer.render(&template, &ctx.values)
        }))
        .unwrap_or_else(|_| Err(RenderError::Panicked))
        .map_err(|err| RenderFailure::new(RenderStage::Render, RenderCause::Render(err)))?;
        ctx.rendered();

        let result = RenderResult {
            document: Bytes::from(document.bytes),
            content_type: document.content_type,
            template_id: template.id,
            template_version: template.version,
            template_scope: template.scope,
            rendered_at: ctx.rendered_at,
        };
        ctx.completed();
        Ok(result)
    }

    async fn authenticate(&self, request: &RenderRequest) -> Result<Principal, RenderCause> {
        let verify = self.auth.verify(&request.credential);
        let principal = tokio::time::timeout(self.config.auth_timeout, verify)
            .await
            .map_err(|_| RenderCause::AuthTimeout)?
            .map_err(RenderCause::Unauthorized)?;
        principal
            .requires(ApiScope::Render)
            .and_then(|()| principal.may_act_for(&request.tenant_code))
            .map_err(RenderCause::Unauthorized)?;
        Ok(principal)
    }

    /// Fills every declared placeholder exactly once.
    ///
    /// Values the mapper already supplied are taken as-is. The rest are
    /// produced by their injectors with bounded concurrency; the first failure
    /// drops the remaining injector futures.
    async fn inject(
        &self,
        ctx: &RenderContext<'_>,
        template: &TemplateDefinition,
        cancel: &CancellationToken,
    ) -> Result<HashMap<InjectionKey, InjectedValue>, RenderCause> {
        let declared = template.declared_keys();
        let mut values = HashMap::with_capacity(declared.len());
        let mut pending = Vec::new();
        for key in declared {
            match ctx.mapped.injectables.get(&key) {
                Some(value) => {
                    values.insert(key, value.clone());
                }
                None => pending.push(key),
            }
        }

        let registry = self.engine.injectors();
        if let Some(key) = pending.iter().find(|key| !registry.contains(key)) {
            return Err(RenderCause::UnknownInjector { key: key.clone() });
        }

        let request = ctx.request;
        let shared = self.engine.shared();
        let timeout = self.config.injector_timeout;
        let produced: Vec<(InjectionKey, InjectedValue)> = stream::iter(pending)
            .map(|key| async move {
                let injection = InjectionContext {
                    tenant_code: &request.tenant_code,
                    workspace_code: &request.workspace_code,
                    document_type_code: &request.document_type_code,
                    rendered_at: ctx.rendered_at,
                    key: &key,
                    payload: &ctx.mapped.payload,
                    injectables: &ctx.mapped.injectables,
                    shared,
                    cancellation: cancel,
                };
                let outcome = AssertUnwindSafe(registry.resolve(&injection, timeout))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(InjectionFailure::Execution {
                            key: key.clone(),
                            source: InjectorError::failed("injector panicked"),
                        })
                    });
                outcome.map(|value| (key, value))
            })
            .buffer_unordered(self.config.injector_concurrency.max(1))
            .try_collect()
            .await?;

        values.extend(produced);
        Ok(values)
    }
}

/// Runs an async stage, racing it against cancellation and the deadline.
async fn guard<T>(
    stage: RenderStage,
    cancel: &CancellationToken,
    deadline: Instant,
    work: impl Future<Output = Result<T, RenderCause>>,
) -> Result<T, RenderFailure> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(stage, CancelReason::Caller)),
        _ = tokio::time::sleep_until(deadline) => Err(cancelled(stage, CancelReason::Deadline)),
        result = work => result.map_err(|cause| RenderFailure::new(stage, cause)),
    }
}

/// Cancellation check between synchronous stages.
fn checkpoint(
    stage: RenderStage,
    cancel: &CancellationToken,
    deadline: Instant,
) -> Result<(), RenderFailure> {
    if cancel.is_cancelled() {
        return Err(cancelled(stage, CancelReason::Caller));
    }
    if Instant::now() >= deadline {
        return Err(cancelled(stage, CancelReason::Deadline));
    }
    Ok(())
}

fn cancelled(stage: RenderStage, reason: CancelReason) -> RenderFailure {
    RenderFailure::new(stage, RenderCause::Cancelled { reason })
}
