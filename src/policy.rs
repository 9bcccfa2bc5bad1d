//! Collection access policy

use crate::profiler::CollectionProfile;
use std::collections::HashSet;

/// Decides whether a collection may be surfaced to resolution.
pub trait AccessPolicy: Send + Sync {
    fn is_accessible(&self, collection: &str) -> bool;
}

/// Deny-list of restricted collection names (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    restricted: HashSet<String>,
}

impl DenyList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            restricted: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }
}

impl AccessPolicy for DenyList {
    fn is_accessible(&self, collection: &str) -> bool {
        !self.restricted.contains(&collection.trim().to_lowercase())
    }
}

/// Keep only the profiles the policy allows, in their original order.
pub fn accessible_profiles(policy: &dyn AccessPolicy, profiles: &[CollectionProfile]) -> Vec<CollectionProfile> {
    profiles
        .iter()
        .filter(|p| policy.is_accessible(&p.name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_list_is_case_insensitive() {
        let policy = DenyList::new(["Users"]);
        assert!(!policy.is_accessible("users"));
        assert!(!policy.is_accessible(" USERS "));
        assert!(policy.is_accessible("sales"));
    }

    #[test]
    fn test_accessible_profiles_filters() {
        let policy = DenyList::new(vec!["secrets".to_string()]);
        let profile = |name: &str| CollectionProfile {
            name: name.to_string(),
            fields: Vec::new(),
            document_count: 0,
        };
        let kept = accessible_profiles(&policy, &[profile("sales"), profile("secrets")]);
        assert_eq!(kept, vec![profile("sales")]);
    }
}
