//! Template definitions and the scopes they are published under.

use std::collections::{BTreeSet, HashSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;
use super::injection::InjectionKey;

/// Where a template was published. Ordered from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateScope {
    Workspace,
    TenantSystemWorkspace,
    GlobalSystem,
}

impl TemplateScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::TenantSystemWorkspace => "tenant_system_workspace",
            Self::GlobalSystem => "global_system",
        }
    }

    /// Whether templates in this scope carry a tenant code.
    pub fn is_tenant_bound(self) -> bool {
        !matches!(self, Self::GlobalSystem)
    }
}

impl Display for TemplateScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateScope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workspace" => Ok(Self::Workspace),
            "tenant_system_workspace" => Ok(Self::TenantSystemWorkspace),
            "global_system" => Ok(Self::GlobalSystem),
            other => Err(DomainError::validation(format!(
                "unknown template scope `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: Uuid,
    pub scope: TemplateScope,
    pub tenant_code: Option<String>,
    pub workspace_code: Option<String>,
    pub document_type_code: String,
    pub body: String,
    pub placeholders: Vec<InjectionKey>,
    pub active: bool,
    pub version: i32,
    pub created_at: OffsetDateTime,
}

impl TemplateDefinition {
    /// Placeholder keys with duplicates removed, in a stable order.
    pub fn declared_keys(&self) -> BTreeSet<InjectionKey> {
        self.placeholders.iter().cloned().collect()
    }
}

/// Coordinates a new template is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCoordinates {
    pub scope: TemplateScope,
    pub tenant_code: Option<String>,
    pub workspace_code: Option<String>,
    pub document_type_code: String,
}

impl TemplateCoordinates {
    /// Checks that the codes present match what the scope requires.
    ///
    /// Workspace and tenant-system templates carry both tenant and workspace
    /// codes; global templates carry neither.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_code("document type", &self.document_type_code)?;
        match self.scope {
            TemplateScope::Workspace | TemplateScope::TenantSystemWorkspace => {
                let tenant = self.tenant_code.as_deref().ok_or_else(|| {
                    DomainError::validation(format!("{} templates need a tenant code", self.scope))
                })?;
                let workspace = self.workspace_code.as_deref().ok_or_else(|| {
                    DomainError::validation(format!(
                        "{} templates need a workspace code",
                        self.scope
                    ))
                })?;
                validate_code("tenant", tenant)?;
                validate_code("workspace", workspace)
            }
            TemplateScope::GlobalSystem => {
                if self.tenant_code.is_some() || self.workspace_code.is_some() {
                    return Err(DomainError::validation(
                        "global templates cannot carry tenant or workspace codes",
                    ));
                }
                Ok(())
            }
        }
    }
}

pub fn validate_code(label: &str, code: &str) -> Result<(), DomainError> {
    if code.is_empty() || code.len() > 64 {
        return Err(DomainError::validation(format!(
            "{label} code must be 1..=64 characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(DomainError::validation(format!(
            "{label} code `{code}` contains unsupported characters"
        )));
    }
    Ok(())
}

/// Checks a template body against its declared placeholders.
///
/// Every `{{ name }}` in the body must be declared, and no name may be
/// declared under two value types.
pub fn validate_bindings(body: &str, placeholders: &[InjectionKey]) -> Result<(), DomainError> {
    let mut declared: HashSet<&str> = HashSet::new();
    let mut seen_keys: HashSet<&InjectionKey> = HashSet::new();
    for key in placeholders {
        if seen_keys.insert(key) && !declared.insert(key.name()) {
            return Err(DomainError::validation(format!(
                "placeholder `{}` is declared with more than one value type",
                key.name()
            )));
        }
    }

    for segment in scan_placeholders(body) {
        if let TemplateSegment::Placeholder(name) = segment
            && !declared.contains(name)
        {
            return Err(DomainError::validation(format!(
                "template body references undeclared placeholder `{name}`"
            )));
        }
    }
    Ok(())
}

/// A piece of a template body: literal text or a `{{ name }}` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSegment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Splits a body into literal text and placeholder references.
///
/// An unterminated `{{` is kept as text.
pub fn scan_placeholders(body: &str) -> Vec<TemplateSegment<'_>> {
    let mut segments = Vec::new();
    let mut rest = body;

    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };
        if open > 0 {
            segments.push(TemplateSegment::Text(&rest[..open]));
        }
        let name = after_open[..close].trim();
        if name.is_empty() {
            segments.push(TemplateSegment::Text(&rest[open..open + 2 + close + 2]));
        } else {
            segments.push(TemplateSegment::Placeholder(name));
        }
        rest = &after_open[close + 2..];
    }

    if !rest.is_empty() {
        segments.push(TemplateSegment::Text(rest));
    }
    segments
}
