use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::SharedData;
use crate::domain::error::DomainError;
use crate::domain::injection::{InjectedValue, InjectionKey, ValueType};

pub struct MapperContext<'a> {
    pub tenant_code: &'a str,
    pub workspace_code: &'a str,
    pub document_type_code: &'a str,
    pub shared: &'a SharedData,
}

/// Output of a mapper: the parsed payload plus any placeholder values the
/// mapper already knows.
#[derive(Debug, Clone, Default)]
pub struct MappedPayload {
    pub payload: Value,
    pub injectables: HashMap<InjectionKey, InjectedValue>,
}

impl MappedPayload {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            injectables: HashMap::new(),
        }
    }

    pub fn with_value(mut self, key: InjectionKey, value: InjectedValue) -> Self {
        self.injectables.insert(key, value);
        self
    }
}

/// Turns a raw request body for one document type into a [`MappedPayload`].
pub trait Mapper: Send + Sync {
    fn map(&self, ctx: &MapperContext<'_>, raw: &[u8]) -> Result<MappedPayload, MapperError>;

    /// Runs right after `map`; a rejection stops the render before any
    /// injector is invoked.
    fn validate(&self, payload: &Value) -> Result<(), MapperError> {
        let _ = payload;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("payload could not be parsed: {0}")]
    Parse(String),
    #[error("payload failed validation: {0}")]
    Validation(String),
    #[error("value for `{key}` is invalid")]
    InvalidValue {
        key: InjectionKey,
        #[source]
        source: DomainError,
    },
    #[error("mapper supplied a {actual} value for `{key}`")]
    TypeMismatch { key: InjectionKey, actual: ValueType },
}

impl MapperError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[derive(Debug, Error)]
pub enum MappingFailure {
    #[error("no mapper is registered for document type `{document_type}`")]
    UnknownMapper { document_type: String },
    #[error("payload for document type `{document_type}` was rejected")]
    PayloadValidation {
        document_type: String,
        #[source]
        source: MapperError,
    },
}

pub struct MapperRegistry {
    mappers: HashMap<String, Arc<dyn Mapper>>,
}

impl MapperRegistry {
    pub(super) fn new(mappers: HashMap<String, Arc<dyn Mapper>>) -> Self {
        Self { mappers }
    }

    pub fn contains(&self, document_type_code: &str) -> bool {
        self.mappers.contains_key(document_type_code)
    }

    /// Parses and validates `raw` with the mapper registered for the context's
    /// document type.
    pub fn map(
        &self,
        ctx: &MapperContext<'_>,
        raw: &[u8],
    ) -> Result<MappedPayload, MappingFailure> {
        let document_type = ctx.document_type_code;
        let mapper = self
            .mappers
            .get(document_type)
            .ok_or_else(|| MappingFailure::UnknownMapper {
                document_type: document_type.to_string(),
            })?;
        let rejected = |source| MappingFailure::PayloadValidation {
            document_type: document_type.to_string(),
            source,
        };

        let mapped = mapper.map(ctx, raw).map_err(rejected)?;
        mapper.validate(&mapped.payload).map_err(rejected)?;

        if let Some((key, value)) = mapped
            .injectables
            .iter()
            .find(|(key, value)| key.value_type() != value.value_type())
        {
            return Err(rejected(MapperError::TypeMismatch {
                key: key.clone(),
                actual: value.value_type(),
            }));
        }
        Ok(mapped)
    }
}
