/// Session records and per-module permission grants
///
/// The session record is the server-side half of an authenticated
/// session: the bearer token proves identity, the record carries the
/// revocable permission state. Cache entries are parsed strictly at this
/// boundary; a malformed entry invalidates the whole record rather than
/// silently granting or denying capabilities.
pub mod store;

pub use store::{MemorySessionStore, RedisSessionStore, SessionStore};

use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named permission scopes
pub mod modules {
    pub const ACCOUNT: &str = "account";
    pub const WALLET: &str = "wallet";
    pub const PROFILE: &str = "profile";
}

/// Session freshness flag
///
/// `Updated` is set by an explicit invalidation; the record stays in the
/// cache so the next validation fails with a distinguishable reason
/// instead of silently using stale permissions. The only way back to
/// `Created` is a fresh login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    Updated,
}

/// A single module grant inside a session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleGrant {
    pub module_id: String,
    pub module_access: bool,
    pub read_access: bool,
    pub write_access: bool,
    pub delete_access: bool,
}

/// Cache-resident session record, keyed by account id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub module: Vec<ModuleGrant>,
    pub status: SessionStatus,
}

impl SessionRecord {
    /// Build a fresh record for a new login
    pub fn new(token: String, module: Vec<ModuleGrant>) -> Self {
        Self {
            token,
            module,
            status: SessionStatus::Created,
        }
    }

    pub fn to_json(&self) -> GateResult<String> {
        serde_json::to_string(self)
            .map_err(|e| GateError::Cache(format!("Session serialization failed: {}", e)))
    }

    /// Strict parse of a cache payload; any malformed grant fails the record
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Capability level required by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    Delete,
}

/// Request-scoped permission map, projected from a session record
///
/// Duplicate module ids in the grant list resolve last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    grants: HashMap<String, ModuleGrant>,
}

impl PermissionSet {
    pub fn from_grants(grants: &[ModuleGrant]) -> Self {
        let mut map = HashMap::new();
        for grant in grants {
            map.insert(grant.module_id.clone(), grant.clone());
        }
        Self { grants: map }
    }

    pub fn get(&self, module_id: &str) -> Option<&ModuleGrant> {
        self.grants.get(module_id)
    }

    /// Check a capability against the grant for a module
    ///
    /// Read requires `read_access`. Write requires read AND write: a
    /// write-only grant without read is a configuration error and is
    /// denied. Delete requires read AND delete, but not write.
    pub fn allows(&self, module_id: &str, capability: Capability) -> bool {
        let Some(grant) = self.grants.get(module_id) else {
            return false;
        };

        match capability {
            Capability::Read => grant.read_access,
            Capability::Write => grant.read_access && grant.write_access,
            Capability::Delete => grant.read_access && grant.delete_access,
        }
    }

    /// Enforce a capability, producing the uniform denial
    ///
    /// The denial never distinguishes an absent grant from an explicitly
    /// forbidden one.
    pub fn require(&self, module_id: &str, capability: Capability) -> GateResult<()> {
        if self.allows(module_id, capability) {
            Ok(())
        } else {
            Err(GateError::Authorization(format!(
                "Access denied for module {}",
                module_id
            )))
        }
    }
}
