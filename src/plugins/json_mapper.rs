//! Config-declared mapper for JSON object payloads.

use serde_json::Value;

use crate::application::engine::{MappedPayload, Mapper, MapperContext, MapperError};
use crate::config::{ExtractRule, JsonMapperSettings};
use crate::domain::injection::InjectedValue;

/// Parses a JSON object, lifts the configured values into injectables and
/// rejects payloads missing a required pointer.
pub struct JsonPayloadMapper {
    required: Vec<String>,
    extract: Vec<ExtractRule>,
}

impl JsonPayloadMapper {
    pub fn new(required: Vec<String>, extract: Vec<ExtractRule>) -> Self {
        Self { required, extract }
    }

    pub fn from_settings(settings: &JsonMapperSettings) -> Self {
        Self::new(settings.required.clone(), settings.extract.clone())
    }
}

fn lookup<'v>(payload: &'v Value, pointer: &str) -> Option<&'v Value> {
    payload.pointer(pointer).filter(|value| !value.is_null())
}

impl Mapper for JsonPayloadMapper {
    fn map(&self, _ctx: &MapperContext<'_>, raw: &[u8]) -> Result<MappedPayload, MapperError> {
        let payload: Value =
            serde_json::from_slice(raw).map_err(|err| MapperError::parse(err.to_string()))?;
        if !payload.is_object() {
            return Err(MapperError::parse("payload must be a JSON object"));
        }

        let mut injectables = Vec::with_capacity(self.extract.len());
        for rule in &self.extract {
            let Some(raw_value) = lookup(&payload, &rule.pointer) else {
                if rule.optional {
                    continue;
                }
                return Err(MapperError::validation(format!(
                    "`{}` is required for `{}`",
                    rule.pointer, rule.key
                )));
            };
            let value = InjectedValue::from_json(rule.key.value_type(), raw_value).map_err(
                |source| MapperError::InvalidValue {
                    key: rule.key.clone(),
                    source,
                },
            )?;
            injectables.push((rule.key.clone(), value));
        }

        Ok(injectables
            .into_iter()
            .fold(MappedPayload::new(payload), |mapped, (key, value)| {
                mapped.with_value(key, value)
            }))
    }

    fn validate(&self, payload: &Value) -> Result<(), MapperError> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|pointer| lookup(payload, pointer).is_none())
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MapperError::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::SharedData;
    use crate::domain::injection::InjectionKey;

    fn ctx(shared: &SharedData) -> MapperContext<'_> {
        MapperContext {
            tenant_code: "acme",
            workspace_code: "sales",
            document_type_code: "invoice",
            shared,
        }
    }

    fn rule(key: &str, pointer: &str, optional: bool) -> ExtractRule {
        ExtractRule {
            key: key.parse::<InjectionKey>().unwrap(),
            pointer: pointer.to_string(),
            optional,
        }
    }

    fn mapper() -> JsonPayloadMapper {
        JsonPayloadMapper::new(
            vec!["/customer".to_string()],
            vec![
                rule("string:customer", "/customer/name", false),
                rule("number:total", "/total", false),
                rule("list:notes", "/notes", true),
            ],
        )
    }

    #[test]
    fn extracts_typed_values() {
        let shared = SharedData::default();
        let mapped = mapper()
            .map(
                &ctx(&shared),
                br#"{"customer":{"name":"Globex"},"total":12.5}"#,
            )
            .expect("mapped");

        assert_eq!(
            mapped.injectables.get(&"string:customer".parse().unwrap()),
            Some(&InjectedValue::String("Globex".to_string()))
        );
        assert_eq!(
            mapped.injectables.get(&"number:total".parse().unwrap()),
            Some(&InjectedValue::Number(12.5))
        );
        assert!(!mapped.injectables.contains_key(&"list:notes".parse().unwrap()));
    }

    #[test]
    fn non_object_and_malformed_bodies_are_parse_errors() {
        let shared = SharedData::default();
        assert!(matches!(
            mapper().map(&ctx(&shared), b"[1,2]"),
            Err(MapperError::Parse(_))
        ));
        assert!(matches!(
            mapper().map(&ctx(&shared), b"{not json"),
            Err(MapperError::Parse(_))
        ));
    }

    #[test]
    fn missing_required_extraction_is_a_validation_error() {
        let shared = SharedData::default();
        assert!(matches!(
            mapper().map(&ctx(&shared), br#"{"customer":{"name":"Globex"}}"#),
            Err(MapperError::Validation(_))
        ));
    }

    #[test]
    fn wrongly_typed_values_are_rejected() {
        let shared = SharedData::default();
        assert!(matches!(
            mapper().map(
                &ctx(&shared),
                br#"{"customer":{"name":"Globex"},"total":"lots"}"#
            ),
            Err(MapperError::InvalidValue { .. })
        ));
    }

    #[test]
    fn validate_reports_missing_required_pointers() {
        let err = mapper()
            .validate(&serde_json::json!({"customer": null}))
            .expect_err("customer is null");
        assert!(err.to_string().contains("/customer"));
    }
}
