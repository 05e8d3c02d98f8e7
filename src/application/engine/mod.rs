//! Build-time registration of injectors and mappers.
//!
//! Plug-ins register into a [`RenderEngineBuilder`] during startup. `build()`
//! runs the init function once and freezes everything into a [`RenderEngine`]
//! whose tables are read-only for the life of the process.

mod injectors;
mod mappers;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::domain::error::DomainError;
use crate::domain::injection::{InjectionKey, ValueType};

pub use injectors::{InjectionContext, InjectionFailure, Injector, InjectorError, InjectorRegistry};
pub use mappers::{
    MappedPayload, Mapper, MapperContext, MapperError, MapperRegistry, MappingFailure,
};

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Seeds [`SharedData`] once, before the engine is frozen.
pub type InitFunc = Box<dyn FnOnce(&mut SharedDataBuilder) -> Result<(), InitError> + Send>;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("an injector is already registered for `{key}`")]
    DuplicateInjector { key: InjectionKey },
    #[error("a mapper is already registered for document type `{document_type}`")]
    DuplicateMapper { document_type: String },
    #[error("invalid injection key: {0}")]
    InvalidKey(#[from] DomainError),
    #[error("the init function has already been set")]
    InitAlreadySet,
    #[error("init function failed")]
    Init(#[source] InitError),
}

/// Process-wide read-only data produced by the init function.
#[derive(Debug, Clone, Default)]
pub struct SharedData {
    values: Arc<Map<String, Value>>,
}

impl SharedData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SharedDataBuilder {
    values: Map<String, Value>,
}

impl SharedDataBuilder {
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    fn freeze(self) -> SharedData {
        SharedData {
            values: Arc::new(self.values),
        }
    }
}

#[derive(Default)]
pub struct RenderEngineBuilder {
    injectors: HashMap<InjectionKey, Arc<dyn Injector>>,
    mappers: HashMap<String, Arc<dyn Mapper>>,
    init: Option<InitFunc>,
}

impl RenderEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `injector` to `(value_type, name)`.
    ///
    /// A second registration for the same key is rejected and the first one
    /// stays bound.
    pub fn register_injector(
        &mut self,
        value_type: ValueType,
        name: &str,
        injector: impl Injector + 'static,
    ) -> Result<&mut Self, RegistrationError> {
        let key = InjectionKey::new(value_type, name)?;
        if self.injectors.contains_key(&key) {
            return Err(RegistrationError::DuplicateInjector { key });
        }
        self.injectors.insert(key, Arc::new(injector));
        Ok(self)
    }

    pub fn register_mapper(
        &mut self,
        document_type_code: &str,
        mapper: impl Mapper + 'static,
    ) -> Result<&mut Self, RegistrationError> {
        if self.mappers.contains_key(document_type_code) {
            return Err(RegistrationError::DuplicateMapper {
                document_type: document_type_code.to_string(),
            });
        }
        self.mappers
            .insert(document_type_code.to_string(), Arc::new(mapper));
        Ok(self)
    }

    pub fn set_init_func<F>(&mut self, init: F) -> Result<&mut Self, RegistrationError>
    where
        F: FnOnce(&mut SharedDataBuilder) -> Result<(), InitError> + Send + 'static,
    {
        if self.init.is_some() {
            return Err(RegistrationError::InitAlreadySet);
        }
        self.init = Some(Box::new(init));
        Ok(self)
    }

    /// Runs the init function and freezes the registries.
    pub fn build(self) -> Result<RenderEngine, RegistrationError> {
        let mut shared = SharedDataBuilder::default();
        if let Some(init) = self.init {
            init(&mut shared).map_err(RegistrationError::Init)?;
        }
        let shared = shared.freeze();

        info!(
            target = "stampa::engine",
            injectors = self.injectors.len(),
            mappers = self.mappers.len(),
            shared_values = shared.len(),
            "Render engine frozen"
        );

        Ok(RenderEngine {
            injectors: Arc::new(InjectorRegistry::new(self.injectors)),
            mappers: Arc::new(MapperRegistry::new(self.mappers)),
            shared,
        })
    }
}

/// Frozen registries plus the shared init data.
#[derive(Clone)]
pub struct RenderEngine {
    injectors: Arc<InjectorRegistry>,
    mappers: Arc<MapperRegistry>,
    shared: SharedData,
}

impl RenderEngine {
    pub fn injectors(&self) -> &InjectorRegistry {
        &self.injectors
    }

    pub fn mappers(&self) -> &MapperRegistry {
        &self.mappers
    }

    pub fn shared(&self) -> &SharedData {
        &self.shared
    }
}
