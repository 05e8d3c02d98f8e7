//! Config-declared injectors reading the mapped payload or shared data.

use async_trait::async_trait;
use serde_json::Value;

use crate::application::engine::{InjectionContext, Injector, InjectorError};
use crate::domain::injection::InjectedValue;

/// Reads the value at a JSON pointer in the mapped payload.
pub struct PayloadFieldInjector {
    pointer: String,
    default: Option<Value>,
}

impl PayloadFieldInjector {
    pub fn new(pointer: impl Into<String>, default: Option<Value>) -> Self {
        Self {
            pointer: pointer.into(),
            default,
        }
    }
}

#[async_trait]
impl Injector for PayloadFieldInjector {
    async fn inject(&self, ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        let value = ctx
            .payload
            .pointer(&self.pointer)
            .filter(|value| !value.is_null())
            .or(self.default.as_ref())
            .ok_or_else(|| InjectorError::Missing(self.pointer.clone()))?;

        Ok(InjectedValue::from_json(ctx.key.value_type(), value)?)
    }
}

/// Reads a value from the engine's shared init data.
pub struct SharedValueInjector {
    shared_key: String,
}

impl SharedValueInjector {
    pub fn new(shared_key: impl Into<String>) -> Self {
        Self {
            shared_key: shared_key.into(),
        }
    }
}

#[async_trait]
impl Injector for SharedValueInjector {
    async fn inject(&self, ctx: &InjectionContext<'_>) -> Result<InjectedValue, InjectorError> {
        let value = ctx
            .shared
            .get(&self.shared_key)
            .ok_or_else(|| InjectorError::Missing(self.shared_key.clone()))?;

        Ok(InjectedValue::from_json(ctx.key.value_type(), value)?)
    }
}
