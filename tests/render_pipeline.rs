use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use stampa::application::auth::{AuthError, AuthVerifier, Principal};
use stampa::application::catalog::{CatalogHandle, TemplateCatalog};
use stampa::application::engine::{
    InjectionContext, Injector, InjectorError, MappedPayload, Mapper, MapperContext, MapperError,
    RegistrationError, RenderEngineBuilder,
};
use stampa::application::render::{
    CancelReason, ComrakDocumentRenderer, DocumentRenderer, FailureClass, RenderCause,
    RenderError, RenderFailure, RenderPipeline, RenderPipelineConfig, RenderRequest, RenderResult,
    RenderStage, RenderedDocument,
};
use stampa::application::resolver::TemplateResolver;
use stampa::domain::api_keys::ApiScope;
use stampa::domain::injection::{InjectedValue, InjectionKey, ValueType};
use stampa::domain::templates::{TemplateDefinition, TemplateScope};
use stampa::domain::tenants::TenantRecord;

const SYSTEM_TOKEN: &str = "system-token";
const ACME_TOKEN: &str = "acme-token";
const SLOW_TOKEN: &str = "slow-token";

struct StaticAuth;

#[async_trait]
impl AuthVerifier for StaticAuth {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let tenant_code = match token {
            SYSTEM_TOKEN => None,
            SLOW_TOKEN => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                None
            }
            ACME_TOKEN => Some("acme".to_string()),
            "" => return Err(AuthError::Missing),
            _ => return Err(AuthError::Invalid),
        };
        Ok(Principal {
            key_id: Uuid::nil(),
            name: "test".to_string(),
            tenant_code,
            scopes: vec![ApiScope::Render],
        })
    }
}

/// Counts renders so tests can prove rendering never happened.
#[derive(Default)]
struct SpyRenderer {
    inner: ComrakDocumentRenderer,
    calls: AtomicUsize,
    panicking: AtomicBool,
}

impl DocumentRenderer for SpyRenderer {
    fn render(
        &self,
        template: &TemplateDefinition,
        values: &HashMap<InjectionKey, InjectedValue>,
    ) -> Result<RenderedDocument, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.load(Ordering::SeqCst) {
            panic!("renderer bug");
        }
        self.inner.render(template, values)
    }
}

struct JsonMapper;

impl Mapper for JsonMapper {
    fn map(&self, _ctx: &MapperContext<'_>, raw: &[u8]) -> Result<MappedPayload, MapperError> {
        let payload: Value =
            serde_json::from_slice(raw).map_err(|err| MapperError::parse(err.to_string()))?;
        Ok(MappedPayload::new(payload))
    }

    fn validate(&self, payload: &Value) -> Result<(), MapperError> {
        if payload.get("customer").is_some() {
            Ok(())
        } else {
            Err(MapperError::validation("customer is required"))
        }
    }
}

/// Supplies `string:customer` itself.
struct PrefillMapper;

impl Mapper for PrefillMapper {
    fn map(&self, _ctx: &MapperContext<'_>, _raw: &[u8]) -> Result<MappedPayload, MapperError> {
        Ok(MappedPayload::new(Value::Null).with_value(
            key("string:customer"),
            InjectedValue::String("From Mapper".to_string()),
        ))
    }
}

struct PanickingMapper;

impl Mapper for PanickingMapper {
    fn map(&self, _ctx: &MapperContext<'_>, _raw: &[u8]) -> Result<MappedPayload, MapperError> {
        panic!("mapper bug");
    }
}

struct CountingInjector {
    value: InjectedValue,
    calls: Arc<AtomicUsize>,
}

impl CountingInjector {
    fn new(value: InjectedValue) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                value,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Injector for CountingInjector {
    async fn inject(&self, _ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}

struct PayloadCustomer;

#[async_trait]
impl Injector for PayloadCustomer {
    async fn inject(&self, ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        ctx.payload
            .get("customer")
            .and_then(Value::as_str)
            .map(|name| InjectedValue::String(name.to_string()))
            .ok_or_else(|| InjectorError::Missing("customer".to_string()))
    }
}

struct FailingInjector;

#[async_trait]
impl Injector for FailingInjector {
    async fn inject(&self, _ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        Err(InjectorError::failed("exchange rate service unavailable"))
    }
}

struct SlowInjector;

#[async_trait]
impl Injector for SlowInjector {
    async fn inject(&self, _ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(InjectedValue::Number(1.0))
    }
}

struct PanickingInjector;

#[async_trait]
impl Injector for PanickingInjector {
    async fn inject(&self, _ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        panic!("injector bug");
    }
}

fn key(raw: &str) -> InjectionKey {
    raw.parse().expect("valid key")
}

fn template(
    id: u128,
    scope: TemplateScope,
    workspace: Option<&str>,
    version: i32,
    active: bool,
    body: &str,
    placeholders: &[&str],
) -> TemplateDefinition {
    TemplateDefinition {
        id: Uuid::from_u128(id),
        scope,
        tenant_code: scope.is_tenant_bound().then(|| "acme".to_string()),
        workspace_code: workspace.map(str::to_string),
        document_type_code: "invoice".to_string(),
        body: body.to_string(),
        placeholders: placeholders.iter().map(|raw| key(raw)).collect(),
        active,
        version,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

fn workspace_template(id: u128, version: i32, body: &str) -> TemplateDefinition {
    template(
        id,
        TemplateScope::Workspace,
        Some("sales"),
        version,
        true,
        body,
        &["string:customer"],
    )
}

fn system_template(id: u128, body: &str) -> TemplateDefinition {
    template(
        id,
        TemplateScope::TenantSystemWorkspace,
        Some("system"),
        1,
        true,
        body,
        &["string:customer"],
    )
}

fn global_template(id: u128, version: i32, body: &str) -> TemplateDefinition {
    template(
        id,
        TemplateScope::GlobalSystem,
        None,
        version,
        true,
        body,
        &["string:customer"],
    )
}

struct Harness {
    pipeline: RenderPipeline,
    renderer: Arc<SpyRenderer>,
}

fn harness_with(
    templates: Vec<TemplateDefinition>,
    configure: impl FnOnce(&mut RenderEngineBuilder),
    config: RenderPipelineConfig,
) -> Harness {
    let mut builder = RenderEngineBuilder::new();
    configure(&mut builder);
    let engine = builder.build().expect("engine builds");

    let tenants = vec![TenantRecord {
        code: "acme".to_string(),
        system_workspace_code: Some("system".to_string()),
    }];
    let catalog = CatalogHandle::new(TemplateCatalog::new(templates, tenants, "system"));
    let renderer = Arc::new(SpyRenderer::default());
    let pipeline = RenderPipeline::new(
        Arc::new(StaticAuth),
        engine,
        TemplateResolver::new(catalog),
        renderer.clone(),
        config,
    );
    Harness { pipeline, renderer }
}

fn harness(templates: Vec<TemplateDefinition>) -> Harness {
    harness_with(
        templates,
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", PayloadCustomer)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    )
}

fn request(workspace: &str, body: &str) -> RenderRequest {
    RenderRequest {
        tenant_code: "acme".to_string(),
        workspace_code: workspace.to_string(),
        document_type_code: "invoice".to_string(),
        body: Bytes::from(body.to_string()),
        credential: SYSTEM_TOKEN.to_string(),
    }
}

async fn render(harness: &Harness, request: &RenderRequest) -> Result<RenderResult, RenderFailure> {
    harness
        .pipeline
        .render(request, &CancellationToken::new())
        .await
}

fn html(result: &RenderResult) -> String {
    String::from_utf8(result.document.to_vec()).expect("utf-8 document")
}

const PAYLOAD: &str = r#"{"customer":"Globex"}"#;

#[tokio::test]
async fn workspace_template_takes_precedence() {
    let harness = harness(vec![
        workspace_template(1, 1, "Workspace for {{ customer }}"),
        system_template(2, "System for {{ customer }}"),
        global_template(3, 1, "Global for {{ customer }}"),
    ]);

    let result = render(&harness, &request("sales", PAYLOAD)).await.expect("rendered");

    assert_eq!(result.template_id, Uuid::from_u128(1));
    assert_eq!(result.template_scope, TemplateScope::Workspace);
    assert!(html(&result).contains("Workspace for Globex"));
}

#[tokio::test]
async fn falls_back_to_tenant_system_workspace() {
    let harness = harness(vec![
        system_template(2, "System for {{ customer }}"),
        global_template(3, 1, "Global for {{ customer }}"),
    ]);

    let result = render(&harness, &request("sales", PAYLOAD)).await.expect("rendered");

    assert_eq!(result.template_id, Uuid::from_u128(2));
    assert_eq!(result.template_scope, TemplateScope::TenantSystemWorkspace);
}

#[tokio::test]
async fn global_only_invoice_is_tagged_with_global_template() {
    let harness = harness(vec![
        global_template(3, 1, "Global v1 for {{ customer }}"),
        global_template(4, 2, "Global v2 for {{ customer }}"),
    ]);

    let result = render(&harness, &request("sales", PAYLOAD)).await.expect("rendered");

    assert_eq!(result.template_id, Uuid::from_u128(4));
    assert_eq!(result.template_version, 2);
    assert_eq!(result.template_scope, TemplateScope::GlobalSystem);
    assert_eq!(result.content_type, "text/html; charset=utf-8");
    assert!(html(&result).contains("Global v2 for Globex"));
}

#[tokio::test]
async fn highest_active_version_wins_and_inactive_is_skipped() {
    let mut newest = workspace_template(5, 3, "v3 {{ customer }}");
    newest.active = false;
    let harness = harness(vec![
        workspace_template(1, 1, "v1 {{ customer }}"),
        workspace_template(2, 2, "v2 {{ customer }}"),
        newest,
    ]);

    let result = render(&harness, &request("sales", PAYLOAD)).await.expect("rendered");

    assert_eq!(result.template_id, Uuid::from_u128(2));
    assert_eq!(result.template_version, 2);
}

#[tokio::test]
async fn inactive_workspace_template_falls_through_to_global() {
    let mut inactive = workspace_template(1, 1, "Workspace {{ customer }}");
    inactive.active = false;
    let harness = harness(vec![inactive, global_template(3, 1, "Global {{ customer }}")]);

    let result = render(&harness, &request("sales", PAYLOAD)).await.expect("rendered");

    assert_eq!(result.template_scope, TemplateScope::GlobalSystem);
}

#[tokio::test]
async fn missing_template_fails_at_resolution() {
    let harness = harness(Vec::new());

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("no template");

    assert_eq!(failure.stage, RenderStage::Resolution);
    assert!(matches!(failure.cause, RenderCause::TemplateNotFound { .. }));
    assert_eq!(failure.class(), FailureClass::NotConfigured);
}

#[tokio::test]
async fn duplicate_injector_registration_keeps_the_first() {
    let (first, first_calls) = CountingInjector::new(InjectedValue::String("First".to_string()));
    let (second, second_calls) =
        CountingInjector::new(InjectedValue::String("Second".to_string()));

    let harness = harness_with(
        vec![workspace_template(1, 1, "Hello {{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", first)
                .unwrap();
            let duplicate = builder.register_injector(ValueType::String, "customer", second);
            assert!(matches!(
                duplicate,
                Err(RegistrationError::DuplicateInjector { .. })
            ));
        },
        RenderPipelineConfig::default(),
    );

    let result = render(&harness, &request("sales", PAYLOAD)).await.expect("rendered");

    assert!(html(&result).contains("Hello First"));
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unbound_table_placeholder_fails_with_unknown_injector() {
    let harness = harness(vec![template(
        1,
        TemplateScope::Workspace,
        Some("sales"),
        1,
        true,
        "{{ customer }}\n\n{{ lines }}",
        &["string:customer", "table:lines"],
    )]);

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("no table injector");

    assert_eq!(failure.stage, RenderStage::Injection);
    match failure.cause {
        RenderCause::UnknownInjector { key } => assert_eq!(key.to_string(), "table:lines"),
        other => panic!("unexpected cause: {other:?}"),
    }
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_injector_stops_before_rendering() {
    let harness = harness_with(
        vec![template(
            1,
            TemplateScope::Workspace,
            Some("sales"),
            1,
            true,
            "{{ customer }} at {{ rate }}",
            &["string:customer", "number:rate"],
        )],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", PayloadCustomer)
                .unwrap();
            builder
                .register_injector(ValueType::Number, "rate", FailingInjector)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("injector fails");

    assert_eq!(failure.stage, RenderStage::Injection);
    match &failure.cause {
        RenderCause::InjectorExecution { key, source } => {
            assert_eq!(key.to_string(), "number:rate");
            assert!(source.to_string().contains("exchange rate"));
        }
        other => panic!("unexpected cause: {other:?}"),
    }
    assert_eq!(failure.class(), FailureClass::Internal);
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_injector_is_reported_as_execution_failure() {
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", PanickingInjector)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("injector panics");

    assert_eq!(failure.stage, RenderStage::Injection);
    assert!(matches!(failure.cause, RenderCause::InjectorExecution { .. }));
}

#[tokio::test]
async fn panicking_mapper_fails_at_mapping() {
    let (spy, calls) = CountingInjector::new(InjectedValue::String("unused".to_string()));
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", PanickingMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", spy)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );

    let outcome = tokio::spawn(async move {
        harness
            .pipeline
            .render(&request("sales", PAYLOAD), &CancellationToken::new())
            .await
            .map(|_| ())
    })
    .await
    .expect("render task does not panic");

    let failure = outcome.expect_err("mapper panics");
    assert_eq!(failure.stage, RenderStage::Mapping);
    assert!(matches!(failure.cause, RenderCause::MapperPanicked { .. }));
    assert_eq!(failure.class(), FailureClass::Internal);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_renderer_fails_at_render() {
    let harness = harness(vec![workspace_template(1, 1, "{{ customer }}")]);
    harness.renderer.panicking.store(true, Ordering::SeqCst);

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("renderer panics");

    assert_eq!(failure.stage, RenderStage::Render);
    assert!(matches!(
        failure.cause,
        RenderCause::Render(RenderError::Panicked)
    ));
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn payload_validation_failure_never_invokes_injectors() {
    let (spy, calls) = CountingInjector::new(InjectedValue::String("unused".to_string()));
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", spy)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );

    let failure = render(&harness, &request("sales", r#"{"total":10}"#))
        .await
        .expect_err("customer missing");

    assert_eq!(failure.stage, RenderStage::Mapping);
    assert!(matches!(failure.cause, RenderCause::PayloadValidation(_)));
    assert_eq!(failure.class(), FailureClass::BadRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_document_type_fails_at_mapping() {
    let harness = harness(vec![workspace_template(1, 1, "{{ customer }}")]);
    let mut req = request("sales", PAYLOAD);
    req.document_type_code = "receipt".to_string();

    let failure = render(&harness, &req).await.expect_err("no mapper");

    assert_eq!(failure.stage, RenderStage::Mapping);
    assert!(matches!(failure.cause, RenderCause::UnknownMapper { .. }));
}

#[tokio::test]
async fn mapper_supplied_value_wins_over_injector() {
    let (spy, calls) = CountingInjector::new(InjectedValue::String("From Injector".to_string()));
    let harness = harness_with(
        vec![workspace_template(1, 1, "Hello {{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", PrefillMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", spy)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );

    let result = render(&harness, &request("sales", "ignored")).await.expect("rendered");

    assert!(html(&result).contains("Hello From Mapper"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_declared_placeholder_is_injected_once() {
    let (spy, calls) = CountingInjector::new(InjectedValue::String("Globex".to_string()));
    let harness = harness_with(
        vec![template(
            1,
            TemplateScope::Workspace,
            Some("sales"),
            1,
            true,
            "{{ customer }} and again {{ customer }}",
            &["string:customer", "string:customer"],
        )],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", spy)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );

    let result = render(&harness, &request("sales", PAYLOAD)).await.expect("rendered");

    assert!(html(&result).contains("Globex and again Globex"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn injector_value_type_mismatch_is_rejected() {
    let (wrong, _) = CountingInjector::new(InjectedValue::Bool(true));
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", wrong)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("type mismatch");

    assert_eq!(failure.stage, RenderStage::Injection);
    assert!(matches!(
        failure.cause,
        RenderCause::InjectorExecution {
            source: InjectorError::TypeMismatch { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn rejected_credential_fails_at_auth() {
    let harness = harness(vec![workspace_template(1, 1, "{{ customer }}")]);
    let mut req = request("sales", PAYLOAD);
    req.credential = "nope".to_string();

    let failure = render(&harness, &req).await.expect_err("bad token");

    assert_eq!(failure.stage, RenderStage::Auth);
    assert!(matches!(
        failure.cause,
        RenderCause::Unauthorized(AuthError::Invalid)
    ));
    assert_eq!(failure.class(), FailureClass::Unauthorized);
}

#[tokio::test]
async fn tenant_bound_key_cannot_render_for_another_tenant() {
    let harness = harness(vec![global_template(3, 1, "{{ customer }}")]);
    let mut req = request("sales", PAYLOAD);
    req.credential = ACME_TOKEN.to_string();
    req.tenant_code = "globex".to_string();

    let failure = render(&harness, &req).await.expect_err("wrong tenant");

    assert_eq!(failure.stage, RenderStage::Auth);
    assert!(matches!(
        failure.cause,
        RenderCause::Unauthorized(AuthError::Forbidden(_))
    ));

    req.tenant_code = "acme".to_string();
    assert!(render(&harness, &req).await.is_ok());
}

#[tokio::test]
async fn pre_cancelled_request_fails_with_cancelled() {
    let harness = harness(vec![workspace_template(1, 1, "{{ customer }}")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let failure = harness
        .pipeline
        .render(&request("sales", PAYLOAD), &cancel)
        .await
        .expect_err("cancelled");

    assert_eq!(failure.stage, RenderStage::Auth);
    assert!(matches!(
        failure.cause,
        RenderCause::Cancelled {
            reason: CancelReason::Caller
        }
    ));
    assert_eq!(failure.class(), FailureClass::Transient);
}

#[tokio::test]
async fn cancelling_during_injection_fails_at_injection() {
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", SlowInjector)
                .unwrap();
        },
        RenderPipelineConfig::default(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let failure = harness
        .pipeline
        .render(&request("sales", PAYLOAD), &cancel)
        .await
        .expect_err("cancelled");

    assert_eq!(failure.stage, RenderStage::Injection);
    assert!(matches!(
        failure.cause,
        RenderCause::Cancelled {
            reason: CancelReason::Caller
        }
    ));
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn request_deadline_cancels_slow_injection() {
    let config = RenderPipelineConfig {
        request_timeout: Duration::from_millis(100),
        injector_timeout: Duration::from_secs(10),
        ..RenderPipelineConfig::default()
    };
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", SlowInjector)
                .unwrap();
        },
        config,
    );

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("deadline");

    assert_eq!(failure.stage, RenderStage::Injection);
    assert_eq!(failure.cause.code(), "timed_out");
}

#[tokio::test]
async fn injector_timeout_is_a_transient_execution_failure() {
    let config = RenderPipelineConfig {
        injector_timeout: Duration::from_millis(50),
        ..RenderPipelineConfig::default()
    };
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", SlowInjector)
                .unwrap();
        },
        config,
    );

    let failure = render(&harness, &request("sales", PAYLOAD))
        .await
        .expect_err("injector timeout");

    assert!(matches!(
        failure.cause,
        RenderCause::InjectorExecution {
            source: InjectorError::Timeout(_),
            ..
        }
    ));
    assert_eq!(failure.class(), FailureClass::Transient);
}

#[tokio::test]
async fn slow_credential_check_times_out_at_auth() {
    let (spy, calls) = CountingInjector::new(InjectedValue::String("unused".to_string()));
    let config = RenderPipelineConfig {
        auth_timeout: Duration::from_millis(50),
        ..RenderPipelineConfig::default()
    };
    let harness = harness_with(
        vec![workspace_template(1, 1, "{{ customer }}")],
        |builder| {
            builder.register_mapper("invoice", JsonMapper).unwrap();
            builder
                .register_injector(ValueType::String, "customer", spy)
                .unwrap();
        },
        config,
    );
    let mut req = request("sales", PAYLOAD);
    req.credential = SLOW_TOKEN.to_string();

    let failure = render(&harness, &req).await.expect_err("auth timeout");

    assert_eq!(failure.stage, RenderStage::Auth);
    assert!(matches!(failure.cause, RenderCause::AuthTimeout));
    assert_eq!(failure.class(), FailureClass::Transient);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.renderer.calls.load(Ordering::SeqCst), 0);
}
