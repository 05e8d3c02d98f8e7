//! Credential verification seam used by the render pipeline and admin API.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::api_keys::ApiScope;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential")]
    Invalid,
    #[error("expired credential")]
    Expired,
    #[error("revoked credential")]
    Revoked,
    #[error("credential is not allowed to {0}")]
    Forbidden(String),
    #[error("credential store unavailable")]
    Unavailable,
}

/// The identity behind an admitted credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub key_id: Uuid,
    pub name: String,
    /// `None` for system keys that may act for every tenant.
    pub tenant_code: Option<String>,
    pub scopes: Vec<ApiScope>,
}

impl Principal {
    pub fn requires(&self, needed: ApiScope) -> Result<(), AuthError> {
        if self.scopes.contains(&needed) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!("use scope `{needed}`")))
        }
    }

    pub fn may_act_for(&self, tenant_code: &str) -> Result<(), AuthError> {
        match self.tenant_code.as_deref() {
            None => Ok(()),
            Some(bound) if bound == tenant_code => Ok(()),
            Some(_) => Err(AuthError::Forbidden(format!(
                "act for tenant `{tenant_code}`"
            ))),
        }
    }

    pub fn is_system(&self) -> bool {
        self.tenant_code.is_none()
    }
}

/// Confirms a bearer credential. Any `Ok` admits the caller.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}
