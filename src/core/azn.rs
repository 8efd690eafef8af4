//! Authorization gate consulted before a capability is shown or scheduled.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::AuthorizationConfig;
use crate::model::Capability;

/// Decides whether an identity may see and use a capability.
pub trait Authorization: Send + Sync {
    /// `true` when `identity` may use `capability`.
    fn check(&self, capability: &Capability, identity: &str) -> bool;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationOff;

impl Authorization for AuthorizationOff {
    fn check(&self, _capability: &Capability, _identity: &str) -> bool {
        true
    }
}

/// Role-based authorization: identities hold roles, capabilities are granted
/// to roles. Capabilities without grants are visible to nobody.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationOn {
    identity_roles: BTreeMap<String, BTreeSet<String>>,
    capability_roles: BTreeMap<String, BTreeSet<String>>,
}

impl AuthorizationOn {
    /// Empty policy that denies everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `identity` a role.
    #[must_use]
    pub fn with_identity_role(mut self, identity: impl Into<String>, role: impl Into<String>) -> Self {
        self.identity_roles
            .entry(identity.into())
            .or_default()
            .insert(role.into());
        self
    }

    /// Grant the capability labelled `label` to a role.
    #[must_use]
    pub fn with_grant(mut self, label: impl Into<String>, role: impl Into<String>) -> Self {
        self.capability_roles
            .entry(label.into())
            .or_default()
            .insert(role.into());
        self
    }

    /// Build from the configuration section.
    #[must_use]
    pub fn from_config(config: &AuthorizationConfig) -> Self {
        let mut policy = Self::new();
        for (identity, roles) in &config.identities {
            for role in roles {
                policy = policy.with_identity_role(identity.clone(), role.clone());
            }
        }
        for (label, roles) in &config.capabilities {
            for role in roles {
                policy = policy.with_grant(label.clone(), role.clone());
            }
        }
        policy
    }
}

impl Authorization for AuthorizationOn {
    fn check(&self, capability: &Capability, identity: &str) -> bool {
        match (
            self.capability_roles.get(&capability.label),
            self.identity_roles.get(identity),
        ) {
            (Some(granted), Some(held)) => !granted.is_disjoint(held),
            _ => false,
        }
    }
}

/// Role-based policy when a section is configured, otherwise allow all.
#[must_use]
pub fn authorization_from_config(config: Option<&AuthorizationConfig>) -> Arc<dyn Authorization> {
    match config {
        Some(section) => Arc::new(AuthorizationOn::from_config(section)),
        None => Arc::new(AuthorizationOff),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_off() {
        assert!(AuthorizationOff.check(&Capability::new("any"), "anyone"));
    }

    #[test]
    fn test_authorization_on() {
        let policy = AuthorizationOn::new()
            .with_identity_role("org.example.Clients.Client-1", "guest")
            .with_grant("ping-test", "guest");
        let cap = Capability::new("ping-test");
        assert!(policy.check(&cap, "org.example.Clients.Client-1"));
        assert!(!policy.check(&cap, "Dummy"));
        assert!(!policy.check(&Capability::new("trace-test"), "org.example.Clients.Client-1"));
    }
}
