//! Credential resolution for remote connection descriptors.
//!
//! Rules are evaluated in order and the first match wins. A rule that names
//! no servers or instances is an account-wide fallback, so specific rules for
//! an account must come before its fallback.

use portalsync_types::{CredentialHandle, RemoteDescriptor};
use serde::Deserialize;

/// Maps an account (optionally narrowed by server or instance) to a credential.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialRule {
    pub account: String,
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub instances: Vec<String>,
    /// Matches any instance containing this fragment.
    #[serde(default)]
    pub instance_contains: Option<String>,
    pub credential: CredentialHandle,
}

impl CredentialRule {
    /// Rule applies to every server and instance of its account.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.servers.is_empty() && self.instances.is_empty() && self.instance_contains.is_none()
    }

    #[must_use]
    pub fn same_account(&self, other: &Self) -> bool {
        self.account.eq_ignore_ascii_case(&other.account)
    }

    #[must_use]
    pub fn matches(&self, remote: &RemoteDescriptor) -> bool {
        let Some(account) = remote.account.as_deref() else {
            return false;
        };
        if !self.account.eq_ignore_ascii_case(account) {
            return false;
        }
        if self.is_fallback() {
            return true;
        }

        let server = remote.server.as_deref().unwrap_or_default();
        let instance = remote.instance.as_deref().unwrap_or_default();
        let server_hit = self
            .servers
            .iter()
            .any(|s| !server.is_empty() && s.eq_ignore_ascii_case(server));
        let instance_hit = self
            .instances
            .iter()
            .any(|i| !instance.is_empty() && i.eq_ignore_ascii_case(instance));
        let fragment_hit = self.instance_contains.as_deref().is_some_and(|fragment| {
            !fragment.is_empty()
                && instance
                    .to_ascii_lowercase()
                    .contains(&fragment.to_ascii_lowercase())
        });
        server_hit || instance_hit || fragment_hit
    }
}

/// Ordered rule table consulted by extraction workers.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    rules: Vec<CredentialRule>,
}

impl CredentialTable {
    #[must_use]
    pub fn new(rules: Vec<CredentialRule>) -> Self {
        Self { rules }
    }

    /// Credential for `remote`, or `None` when no rule applies.
    #[must_use]
    pub fn resolve(&self, remote: &RemoteDescriptor) -> Option<&CredentialHandle> {
        self.rules
            .iter()
            .find(|rule| rule.matches(remote))
            .map(|rule| &rule.credential)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(account: &str, server: Option<&str>, instance: Option<&str>) -> RemoteDescriptor {
        RemoteDescriptor {
            account: Some(account.into()),
            server: server.map(Into::into),
            instance: instance.map(Into::into),
            dataset: "GIS.ROADS".into(),
            feature_dataset: None,
        }
    }

    fn rule(account: &str, servers: &[&str], credential: &str) -> CredentialRule {
        CredentialRule {
            account: account.into(),
            servers: servers.iter().map(|s| (*s).to_string()).collect(),
            instances: Vec::new(),
            instance_contains: None,
            credential: CredentialHandle::new(credential),
        }
    }

    fn table() -> CredentialTable {
        let mut by_instance = rule("crw", &[], "crw_azure.sde");
        by_instance.instance_contains = Some("azure".into());
        CredentialTable::new(vec![
            rule("gisuser", &["gisprod01"], "gisuser_prod.sde"),
            rule("gisuser", &[], "gisuser.sde"),
            by_instance,
            rule("crw", &[], "crw.sde"),
        ])
    }

    #[test]
    fn specific_rule_wins_over_fallback() {
        let t = table();
        let hit = t.resolve(&remote("GISUSER", Some("GISPROD01"), None)).unwrap();
        assert_eq!(hit.as_str(), "gisuser_prod.sde");
    }

    #[test]
    fn fallback_covers_other_servers() {
        let t = table();
        let hit = t.resolve(&remote("gisuser", Some("gistest02"), None)).unwrap();
        assert_eq!(hit.as_str(), "gisuser.sde");
    }

    #[test]
    fn instance_fragment_matches_case_insensitively() {
        let t = table();
        let hit = t
            .resolve(&remote("crw", None, Some("sde:sqlserver:CRW-Azure-01")))
            .unwrap();
        assert_eq!(hit.as_str(), "crw_azure.sde");
        let other = t.resolve(&remote("crw", None, Some("crwdb01"))).unwrap();
        assert_eq!(other.as_str(), "crw.sde");
    }

    #[test]
    fn unknown_account_resolves_to_none() {
        assert!(table().resolve(&remote("parcels", Some("gisprod01"), None)).is_none());
    }

    #[test]
    fn descriptor_without_account_never_matches() {
        let mut anonymous = remote("gisuser", Some("gisprod01"), None);
        anonymous.account = None;
        assert!(table().resolve(&anonymous).is_none());
    }
}
