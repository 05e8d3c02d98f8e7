//! Domain types for API keys and scopes.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Permission scope granted to an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiScope {
    Render,
    TemplateRead,
    TemplateWrite,
}

impl ApiScope {
    /// Returns the slug used for serialization and DB storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::TemplateRead => "template_read",
            Self::TemplateWrite => "template_write",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Render => "Render documents",
            Self::TemplateRead => "Template read",
            Self::TemplateWrite => "Template write",
        }
    }

    pub fn all() -> &'static [ApiScope] {
        &[Self::Render, Self::TemplateRead, Self::TemplateWrite]
    }
}

impl Display for ApiScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiScope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "render" => Ok(Self::Render),
            "template_read" => Ok(Self::TemplateRead),
            "template_write" => Ok(Self::TemplateWrite),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub name: String,
    /// Tenant the key is bound to. `None` marks a system key valid for every tenant.
    pub tenant_code: Option<String>,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub scopes: Vec<ApiScope>,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub last_used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl ApiKeyRecord {
    pub fn is_revoked_at(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_some_and(|revoked_at| revoked_at <= now)
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_round_trip_through_their_slugs() {
        for scope in ApiScope::all() {
            assert_eq!(scope.as_str().parse::<ApiScope>(), Ok(*scope));
        }
        assert!("post_write".parse::<ApiScope>().is_err());
    }

    #[test]
    fn expiry_and_revocation_are_time_relative() {
        let now = OffsetDateTime::now_utc();
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            name: "ci".to_string(),
            tenant_code: None,
            prefix: "abc".to_string(),
            hashed_secret: Vec::new(),
            scopes: vec![ApiScope::Render],
            expires_at: Some(now + time::Duration::hours(1)),
            revoked_at: Some(now - time::Duration::minutes(1)),
            last_used_at: None,
            created_at: now,
        };

        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + time::Duration::hours(2)));
        assert!(record.is_revoked_at(now));
    }
}
