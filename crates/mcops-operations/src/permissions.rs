//! Actor identity and the permission seam.
//!
//! Authentication and role management live outside this crate. All the
//! registry needs is who is asking and a yes/no answer per permission.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Who is running an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Stable id (e-mail for humans, a fixed name for schedulers).
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            is_admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(id)
        }
    }

    /// Identity used by the automatic schedulers.
    pub fn scheduler(name: &str) -> Self {
        Self {
            display_name: format!("{} scheduler", name),
            ..Self::admin(format!("scheduler:{}", name))
        }
    }

    /// Label written to traces: the id, or "unknown" when blank.
    pub fn label(&self) -> &str {
        if self.id.trim().is_empty() {
            "unknown"
        } else {
            &self.id
        }
    }
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn has_permission(&self, actor: &Actor, permission: &str) -> bool;
}

/// Fixed grants: admins hold everything, everyone else what is listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticPermissions {
    #[serde(default)]
    grants: HashMap<String, HashSet<String>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, actor_id: impl Into<String>, permission: impl Into<String>) -> Self {
        self.grants
            .entry(actor_id.into())
            .or_default()
            .insert(permission.into());
        self
    }

    pub fn from_grants(grants: HashMap<String, Vec<String>>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|(actor, perms)| (actor, perms.into_iter().collect()))
                .collect(),
        }
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissions {
    async fn has_permission(&self, actor: &Actor, permission: &str) -> bool {
        actor.is_admin
            || self
                .grants
                .get(&actor.id)
                .map_or(false, |perms| perms.contains(permission))
    }
}
