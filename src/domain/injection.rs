//! Placeholder identities and the typed values injected into them.
//!
//! A template declares each placeholder as an [`InjectionKey`]: a value type
//! from a closed set plus a key name. Mappers and injectors produce
//! [`InjectedValue`]s whose type must agree with the key they fill.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::error::DomainError;

const MAX_KEY_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Bool,
    Time,
    Image,
    Table,
    List,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Time => "time",
            Self::Image => "image",
            Self::Table => "table",
            Self::List => "list",
        }
    }

    pub fn all() -> &'static [ValueType] {
        &[
            Self::String,
            Self::Number,
            Self::Bool,
            Self::Time,
            Self::Image,
            Self::Table,
            Self::List,
        ]
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == normalized)
            .ok_or_else(|| DomainError::validation(format!("unknown value type `{s}`")))
    }
}

/// Identity of one placeholder slot: `(value type, key name)`.
///
/// The textual form is `type:name`, e.g. `table:line_items`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InjectionKey {
    value_type: ValueType,
    name: String,
}

impl InjectionKey {
    pub fn new(value_type: ValueType, name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        validate_key_name(&name)?;
        Ok(Self { value_type, name })
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_key_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() || name.len() > MAX_KEY_NAME_LEN {
        return Err(DomainError::validation(format!(
            "injection key name must be 1..={MAX_KEY_NAME_LEN} characters"
        )));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(DomainError::validation(format!(
            "injection key name `{name}` may only contain a-z, 0-9, `_`, `.` and `-`"
        )));
    }
    Ok(())
}

impl Display for InjectionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.value_type, self.name)
    }
}

impl FromStr for InjectionKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value_type, name) = s.split_once(':').ok_or_else(|| {
            DomainError::validation(format!("injection key `{s}` must look like `type:name`"))
        })?;
        Self::new(value_type.parse()?, name.trim())
    }
}

impl TryFrom<String> for InjectionKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InjectionKey> for String {
    fn from(key: InjectionKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageValue {
    Url { url: String },
    Inline { media_type: String, data: Vec<u8> },
}

impl ImageValue {
    pub fn inline(media_type: impl Into<String>, data: Vec<u8>) -> Result<Self, DomainError> {
        let media_type = media_type.into();
        if !media_type.starts_with("image/") {
            return Err(DomainError::invalid_value(
                ValueType::Image,
                format!("media type `{media_type}` is not an image type"),
            ));
        }
        Ok(Self::Inline { media_type, data })
    }

    /// Address usable in an `src` attribute: the URL itself or a base64 data URI.
    pub fn source(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Inline { media_type, data } => {
                format!("data:{media_type};base64,{}", BASE64.encode(data))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableValue {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableValue {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, DomainError> {
        if columns.is_empty() {
            return Err(DomainError::invalid_value(
                ValueType::Table,
                "a table needs at least one column",
            ));
        }
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(DomainError::invalid_value(
                ValueType::Table,
                format!(
                    "row {index} has {} cells but the table has {} columns",
                    row.len(),
                    columns.len()
                ),
            ));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// A value produced for a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectedValue {
    String(String),
    Number(f64),
    Bool(bool),
    Time(OffsetDateTime),
    Image(ImageValue),
    Table(TableValue),
    List(Vec<String>),
}

impl InjectedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Number(_) => ValueType::Number,
            Self::Bool(_) => ValueType::Bool,
            Self::Time(_) => ValueType::Time,
            Self::Image(_) => ValueType::Image,
            Self::Table(_) => ValueType::Table,
            Self::List(_) => ValueType::List,
        }
    }

    /// Coerce a JSON value into the requested value type.
    pub fn from_json(value_type: ValueType, value: &Value) -> Result<Self, DomainError> {
        let invalid = |message: &str| DomainError::invalid_value(value_type, message);

        match value_type {
            ValueType::String => match value {
                Value::String(text) => Ok(Self::String(text.clone())),
                Value::Number(_) | Value::Bool(_) => Ok(Self::String(value.to_string())),
                _ => Err(invalid("expected a string, number or bool")),
            },
            ValueType::Number => match value {
                Value::Number(number) => number
                    .as_f64()
                    .map(Self::Number)
                    .ok_or_else(|| invalid("number out of range")),
                Value::String(text) => text
                    .trim()
                    .parse::<f64>()
                    .map(Self::Number)
                    .map_err(|_| invalid("string is not numeric")),
                _ => Err(invalid("expected a number")),
            },
            ValueType::Bool => match value {
                Value::Bool(flag) => Ok(Self::Bool(*flag)),
                Value::String(text) => match text.trim() {
                    "true" => Ok(Self::Bool(true)),
                    "false" => Ok(Self::Bool(false)),
                    _ => Err(invalid("expected `true` or `false`")),
                },
                _ => Err(invalid("expected a bool")),
            },
            ValueType::Time => match value {
                Value::String(text) => OffsetDateTime::parse(text.trim(), &Rfc3339)
                    .map(Self::Time)
                    .map_err(|err| invalid(&format!("not an RFC 3339 timestamp: {err}"))),
                Value::Number(number) => number
                    .as_i64()
                    .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                    .map(Self::Time)
                    .ok_or_else(|| invalid("unix timestamp out of range")),
                _ => Err(invalid("expected an RFC 3339 string or unix timestamp")),
            },
            ValueType::Image => image_from_json(value).map(Self::Image),
            ValueType::Table => table_from_json(value).map(Self::Table),
            ValueType::List => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        scalar_to_string(item).ok_or_else(|| invalid("list items must be scalars"))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::List),
                _ => Err(invalid("expected an array")),
            },
        }
    }
}

fn image_from_json(value: &Value) -> Result<ImageValue, DomainError> {
    let invalid = |message: String| DomainError::invalid_value(ValueType::Image, message);

    match value {
        Value::String(url) => Ok(ImageValue::Url { url: url.clone() }),
        Value::Object(map) => {
            if let Some(url) = map.get("url").and_then(Value::as_str) {
                return Ok(ImageValue::Url {
                    url: url.to_string(),
                });
            }
            let media_type = map
                .get("media_type")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("inline images need `media_type`".to_string()))?;
            let encoded = map
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("inline images need base64 `data`".to_string()))?;
            let data = BASE64
                .decode(encoded.trim())
                .map_err(|err| invalid(format!("invalid base64 image data: {err}")))?;
            ImageValue::inline(media_type, data)
        }
        _ => Err(invalid(
            "expected a URL string or an object with `url` or `media_type`/`data`".to_string(),
        )),
    }
}

fn table_from_json(value: &Value) -> Result<TableValue, DomainError> {
    let invalid = |message: &str| DomainError::invalid_value(ValueType::Table, message);

    match value {
        Value::Object(map) => {
            let columns = map
                .get("columns")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("table objects need a `columns` array"))?
                .iter()
                .map(|column| {
                    scalar_to_string(column).ok_or_else(|| invalid("column names must be scalars"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let rows = map
                .get("rows")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .map(|row| {
                    row.as_array()
                        .ok_or_else(|| invalid("table rows must be arrays"))?
                        .iter()
                        .map(|cell| {
                            scalar_to_string(cell)
                                .ok_or_else(|| invalid("table cells must be scalars"))
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?;
            TableValue::new(columns, rows)
        }
        Value::Array(records) => {
            let first = records
                .first()
                .and_then(Value::as_object)
                .ok_or_else(|| invalid("record tables need at least one object"))?;
            let columns: Vec<String> = first.keys().cloned().collect();
            let rows = records
                .iter()
                .map(|record| {
                    let record = record
                        .as_object()
                        .ok_or_else(|| invalid("record tables must only contain objects"))?;
                    columns
                        .iter()
                        .map(|column| match record.get(column) {
                            Some(cell) => scalar_to_string(cell)
                                .ok_or_else(|| invalid("table cells must be scalars")),
                            None => Ok(String::new()),
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?;
            TableValue::new(columns, rows)
        }
        _ => Err(invalid("expected a table object or an array of records")),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn keys_parse_from_their_textual_form() {
        let key: InjectionKey = "table:line_items".parse().expect("valid key");
        assert_eq!(key.value_type(), ValueType::Table);
        assert_eq!(key.name(), "line_items");
        assert_eq!(key.to_string(), "table:line_items");
    }

    #[test]
    fn keys_reject_bad_names_and_types() {
        assert!("line_items".parse::<InjectionKey>().is_err());
        assert!("matrix:cells".parse::<InjectionKey>().is_err());
        assert!("string:Has Space".parse::<InjectionKey>().is_err());
        assert!(InjectionKey::new(ValueType::String, "").is_err());
    }

    #[test]
    fn keys_deserialize_from_strings() {
        let key: InjectionKey = serde_json::from_value(json!("time:due_at")).expect("key");
        assert_eq!(key, InjectionKey::new(ValueType::Time, "due_at").unwrap());
    }

    #[test]
    fn json_scalars_coerce_to_requested_types() {
        assert_eq!(
            InjectedValue::from_json(ValueType::Number, &json!("12.5")).unwrap(),
            InjectedValue::Number(12.5)
        );
        assert_eq!(
            InjectedValue::from_json(ValueType::String, &json!(42)).unwrap(),
            InjectedValue::String("42".to_string())
        );
        assert_eq!(
            InjectedValue::from_json(ValueType::Time, &json!("2024-03-01T10:00:00Z")).unwrap(),
            InjectedValue::Time(datetime!(2024-03-01 10:00:00 UTC))
        );
        assert!(InjectedValue::from_json(ValueType::Bool, &json!("maybe")).is_err());
    }

    #[test]
    fn record_arrays_become_tables() {
        let value = json!([
            {"item": "Widget", "qty": 2},
            {"item": "Gadget"}
        ]);
        let InjectedValue::Table(table) =
            InjectedValue::from_json(ValueType::Table, &value).unwrap()
        else {
            panic!("expected a table");
        };
        assert_eq!(table.columns(), ["item", "qty"]);
        assert_eq!(table.rows()[1], vec!["Gadget".to_string(), String::new()]);
    }

    #[test]
    fn ragged_tables_are_rejected() {
        let result = TableValue::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec!["only one".to_string()]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn inline_images_render_as_data_uris() {
        let value = json!({"media_type": "image/png", "data": "AAEC"});
        let InjectedValue::Image(image) =
            InjectedValue::from_json(ValueType::Image, &value).unwrap()
        else {
            panic!("expected an image");
        };
        assert_eq!(image.source(), "data:image/png;base64,AAEC");
        assert!(ImageValue::inline("text/html", Vec::new()).is_err());
    }
}
