//! Role policy for the audit and promotion surfaces
//!
//! Provides:
//! - The three-tier reviewer role model
//! - A single static permission table consulted by every privileged call site
//! - The actor-id -> role directory fed from configuration
//! - Actor context extraction for axum handlers

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Reviewer roles, least privileged last
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    /// Senior reviewer
    Spsa,
    /// Standard reviewer
    Psa,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Spsa => "spsa",
            UserRole::Psa => "psa",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "spsa" => Some(UserRole::Spsa),
            "psa" => Some(UserRole::Psa),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privileged actions gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Set a record's audit status to accepted
    Accept,
    /// Set a record's audit status to rejected
    Reject,
    /// Flag a record for further review
    Review,
    /// Re-open a terminal record back to pending
    Reset,
    /// Promote a submission's accepted records to production
    Promote,
    /// Delete aged fully-rejected submissions
    Cleanup,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Accept => "accept",
            AuditAction::Reject => "reject",
            AuditAction::Review => "review",
            AuditAction::Reset => "reset",
            AuditAction::Promote => "promote",
            AuditAction::Cleanup => "cleanup",
        }
    }
}

/// The single permission table.
///
/// Accepting is the gate to promotion, so it carries the same privilege
/// level as promotion itself; reject/review are open to all reviewers.
pub fn can(role: UserRole, action: AuditAction) -> bool {
    match action {
        AuditAction::Reject | AuditAction::Review => true,
        AuditAction::Accept
        | AuditAction::Reset
        | AuditAction::Promote
        | AuditAction::Cleanup => matches!(role, UserRole::Admin | UserRole::Spsa),
    }
}

/// Require a permission, returning PermissionDenied otherwise
pub fn require(role: UserRole, action: AuditAction) -> Result<()> {
    if can(role, action) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied {
            role: role.to_string(),
            action: action.as_str().to_string(),
        })
    }
}

/// Actor-id -> role lookup backed by configuration.
///
/// The identity provider itself is external; by the time a request reaches
/// the gateway the actor id has already been authenticated upstream.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    roles: HashMap<String, UserRole>,
}

impl RoleDirectory {
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut roles = HashMap::new();
        for (actor, role) in &config.roles {
            match UserRole::parse(role) {
                Some(r) => {
                    roles.insert(actor.clone(), r);
                }
                None => {
                    tracing::warn!(actor = %actor, role = %role, "Unknown role in configuration, ignoring mapping");
                }
            }
        }
        Self { roles }
    }

    /// Resolve an actor to a role; unmapped actors get the least privilege
    pub fn resolve(&self, actor_id: &str) -> UserRole {
        self.roles.get(actor_id).copied().unwrap_or(UserRole::Psa)
    }
}

/// Extracted actor context available to handlers
#[derive(Debug, Clone)]
pub struct ActorContext {
    /// Authenticated actor id (from the upstream identity provider)
    pub actor_id: String,

    /// Resolved reviewer role
    pub role: UserRole,

    /// Request ID for tracing
    pub request_id: String,
}

/// Implemented by gateway state so the extractor can reach the directory
pub trait ProvideRoles {
    fn role_directory(&self) -> &RoleDirectory;
}

impl<S> FromRequestParts<S> for ActorContext
where
    S: ProvideRoles + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        // Extract request ID
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let actor_id = parts
            .headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation {
                message: "Missing X-Actor-ID header".to_string(),
                field: Some("x-actor-id".to_string()),
            })?
            .to_string();

        let role = state.role_directory().resolve(&actor_id);

        Ok(ActorContext {
            actor_id,
            role,
            request_id,
        })
    }
}
