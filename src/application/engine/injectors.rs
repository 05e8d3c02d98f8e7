use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use super::SharedData;
use crate::domain::error::DomainError;
use crate::domain::injection::{InjectedValue, InjectionKey, ValueType};

const METRIC_INJECTOR_MS: &str = "stampa_injector_ms";

/// Everything an injector may read while producing one value.
pub struct InjectionContext<'a> {
    pub tenant_code: &'a str,
    pub workspace_code: &'a str,
    pub document_type_code: &'a str,
    /// Timestamp the render is stamped with.
    pub rendered_at: OffsetDateTime,
    pub key: &'a InjectionKey,
    pub payload: &'a Value,
    pub injectables: &'a HashMap<InjectionKey, InjectedValue>,
    pub shared: &'a SharedData,
    pub cancellation: &'a CancellationToken,
}

/// Produces the value for one placeholder key.
///
/// Implementations hold no per-render state; the same instance serves every
/// concurrent render.
#[async_trait]
pub trait Injector: Send + Sync {
    async fn inject(&self, ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError>;
}

#[derive(Debug, Error)]
pub enum InjectorError {
    #[error("{0}")]
    Failed(String),
    #[error("required input `{0}` is missing")]
    Missing(String),
    #[error("injector did not finish within {0:?}")]
    Timeout(Duration),
    #[error("injector produced a {actual} value for a {expected} placeholder")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
    #[error(transparent)]
    InvalidValue(#[from] DomainError),
}

impl InjectorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, Error)]
pub enum InjectionFailure {
    #[error("no injector is registered for `{key}`")]
    UnknownInjector { key: InjectionKey },
    #[error("injector for `{key}` failed")]
    Execution {
        key: InjectionKey,
        #[source]
        source: InjectorError,
    },
    #[error("injection was cancelled")]
    Cancelled,
}

pub struct InjectorRegistry {
    injectors: HashMap<InjectionKey, Arc<dyn Injector>>,
}

impl InjectorRegistry {
    pub(super) fn new(injectors: HashMap<InjectionKey, Arc<dyn Injector>>) -> Self {
        Self { injectors }
    }

    pub fn contains(&self, key: &InjectionKey) -> bool {
        self.injectors.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.injectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.injectors.is_empty()
    }

    /// Runs the injector bound to `ctx.key` under `timeout`.
    ///
    /// The returned value must carry the key's value type.
    pub async fn resolve(
        &self,
        ctx: &InjectionContext<'_>,
        timeout: Duration,
    ) -> Result<InjectedValue, InjectionFailure> {
        let key = ctx.key;
        let injector =
            self.injectors
                .get(key)
                .ok_or_else(|| InjectionFailure::UnknownInjector { key: key.clone() })?;

        let started_at = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => return Err(InjectionFailure::Cancelled),
            outcome = tokio::time::timeout(timeout, injector.inject(ctx)) => outcome,
        };
        histogram!(METRIC_INJECTOR_MS, "value_type" => key.value_type().as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let execution = |source| InjectionFailure::Execution {
            key: key.clone(),
            source,
        };
        let value = outcome
            .map_err(|_| execution(InjectorError::Timeout(timeout)))?
            .map_err(execution)?;

        if value.value_type() != key.value_type() {
            return Err(execution(InjectorError::TypeMismatch {
                expected: key.value_type(),
                actual: value.value_type(),
            }));
        }
        Ok(value)
    }
}
