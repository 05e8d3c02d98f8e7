//! Injectors and mappers installed from configuration.

pub mod builtin;
pub mod json_mapper;
pub mod payload;

pub use builtin::{ContextField, ContextInjector};
pub use json_mapper::JsonPayloadMapper;
pub use payload::{PayloadFieldInjector, SharedValueInjector};

use tracing::info;

use crate::application::engine::{RegistrationError, RenderEngineBuilder};
use crate::config::PluginSettings;

/// Registers every configured plug-in and seeds the shared data.
///
/// A key or document type declared twice is a startup error.
pub fn install(
    builder: &mut RenderEngineBuilder,
    settings: &PluginSettings,
) -> Result<(), RegistrationError> {
    if settings.builtin_injectors {
        builtin::register(builder)?;
    }

    for mapper in &settings.json_mappers {
        builder.register_mapper(
            &mapper.document_type,
            JsonPayloadMapper::from_settings(mapper),
        )?;
    }

    for injector in &settings.payload_injectors {
        builder.register_injector(
            injector.key.value_type(),
            injector.key.name(),
            PayloadFieldInjector::new(&injector.pointer, injector.default.clone()),
        )?;
    }

    for injector in &settings.shared_injectors {
        builder.register_injector(
            injector.key.value_type(),
            injector.key.name(),
            SharedValueInjector::new(&injector.shared_key),
        )?;
    }

    let shared = settings.shared.clone();
    builder.set_init_func(move |data| {
        for (key, value) in shared {
            data.insert(key, value);
        }
        Ok(())
    })?;

    info!(
        target = "stampa::plugins",
        builtin = settings.builtin_injectors,
        mappers = settings.json_mappers.len(),
        payload_injectors = settings.payload_injectors.len(),
        shared_injectors = settings.shared_injectors.len(),
        "Plug-ins installed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use serde_json::{Value, json};
    use time::macros::datetime;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::application::engine::{InjectionContext, InjectionFailure, RenderEngine};
    use crate::config::{PayloadInjectorSettings, SharedInjectorSettings};
    use crate::domain::injection::{InjectedValue, InjectionKey};

    fn settings() -> PluginSettings {
        let mut shared = serde_json::Map::new();
        shared.insert("company_name".to_string(), json!("Acme Corp"));
        PluginSettings {
            builtin_injectors: true,
            json_mappers: Vec::new(),
            payload_injectors: vec![PayloadInjectorSettings {
                key: "number:total".parse().unwrap(),
                pointer: "/total".to_string(),
                default: Some(json!(0)),
            }],
            shared_injectors: vec![SharedInjectorSettings {
                key: "string:company".parse().unwrap(),
                shared_key: "company_name".to_string(),
            }],
            shared,
        }
    }

    fn engine(settings: &PluginSettings) -> RenderEngine {
        let mut builder = RenderEngineBuilder::new();
        install(&mut builder, settings).expect("installed");
        builder.build().expect("built")
    }

    async fn inject(
        engine: &RenderEngine,
        key: &str,
        payload: &Value,
    ) -> Result<InjectedValue, InjectionFailure> {
        let key: InjectionKey = key.parse().unwrap();
        let injectables = HashMap::new();
        let cancellation = CancellationToken::new();
        let ctx = InjectionContext {
            tenant_code: "acme",
            workspace_code: "sales",
            document_type_code: "invoice",
            rendered_at: datetime!(2025-03-01 10:00 UTC),
            key: &key,
            payload,
            injectables: &injectables,
            shared: engine.shared(),
            cancellation: &cancellation,
        };
        engine
            .injectors()
            .resolve(&ctx, Duration::from_secs(1))
            .await
    }

    #[tokio::test]
    async fn builtin_injectors_read_request_coordinates() {
        let engine = engine(&settings());
        let payload = json!({});

        assert_eq!(
            inject(&engine, "string:tenant_code", &payload).await.unwrap(),
            InjectedValue::String("acme".to_string())
        );
        assert_eq!(
            inject(&engine, "string:document_type", &payload).await.unwrap(),
            InjectedValue::String("invoice".to_string())
        );
        assert_eq!(
            inject(&engine, "time:rendered_at", &payload).await.unwrap(),
            InjectedValue::Time(datetime!(2025-03-01 10:00 UTC))
        );
    }

    #[tokio::test]
    async fn payload_injector_falls_back_to_default() {
        let engine = engine(&settings());

        assert_eq!(
            inject(&engine, "number:total", &json!({"total": 42}))
                .await
                .unwrap(),
            InjectedValue::Number(42.0)
        );
        assert_eq!(
            inject(&engine, "number:total", &json!({})).await.unwrap(),
            InjectedValue::Number(0.0)
        );
    }

    #[tokio::test]
    async fn shared_injector_reads_init_data() {
        let engine = engine(&settings());
        assert_eq!(engine.shared().get("company_name"), Some(&json!("Acme Corp")));
        assert_eq!(
            inject(&engine, "string:company", &json!({})).await.unwrap(),
            InjectedValue::String("Acme Corp".to_string())
        );
    }

    #[tokio::test]
    async fn missing_shared_value_is_an_execution_failure() {
        let mut settings = settings();
        settings.shared.clear();
        let engine = engine(&settings);

        assert!(matches!(
            inject(&engine, "string:company", &json!({})).await,
            Err(InjectionFailure::Execution { .. })
        ));
    }

    #[test]
    fn configured_key_clashing_with_a_builtin_is_rejected() {
        let mut settings = settings();
        settings.payload_injectors.push(PayloadInjectorSettings {
            key: "string:tenant_code".parse().unwrap(),
            pointer: "/tenant".to_string(),
            default: None,
        });

        let mut builder = RenderEngineBuilder::new();
        assert!(matches!(
            install(&mut builder, &settings),
            Err(RegistrationError::DuplicateInjector { .. })
        ));
    }
}
