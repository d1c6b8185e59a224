use crate::models::{Grant, ObjectRef};
use std::collections::HashSet;

/// Lookup key of one grant row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub object_id: String,
    pub content_type: String,
    pub codename: String,
    pub approved: bool,
}

impl GrantKey {
    /// Key for a saved object. None when the object has no identifier.
    pub fn new(codename: &str, target: &ObjectRef, approved: bool) -> Option<Self> {
        Some(Self {
            object_id: target.object_id.clone()?,
            content_type: target.content_type.label(),
            codename: codename.to_string(),
            approved,
        })
    }

    fn from_grant(grant: &Grant) -> Self {
        Self {
            object_id: grant.object_id.clone(),
            content_type: grant.content_type.clone(),
            codename: grant.codename.clone(),
            approved: grant.approved,
        }
    }
}

/// Materialized grant rows, reduced to their lookup keys.
#[derive(Debug, Clone, Default)]
pub struct GrantSet {
    keys: HashSet<GrantKey>,
}

impl GrantSet {
    /// Build from store rows. Rows without exactly one subject never match.
    pub fn from_grants(grants: &[Grant]) -> Self {
        let keys = grants
            .iter()
            .filter(|grant| grant.subject().is_some())
            .map(GrantKey::from_grant)
            .collect();
        Self { keys }
    }

    pub fn contains(&self, key: &GrantKey) -> bool {
        self.keys.contains(key)
    }
}

/// Which of the resolver's lookups a cached set answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSlot {
    /// Grants held by the bound user directly
    User,
    /// Grants held by any group of the bound user
    UserGroups,
    /// Grants held by the bound group
    Group,
}

/// Per-resolver lazy cache.
///
/// Each slot is filled by exactly one store query on first use and then
/// answers from memory until [`invalidate`](Self::invalidate).
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    user: Option<GrantSet>,
    user_groups: Option<GrantSet>,
    group: Option<GrantSet>,
    coarse: Option<HashSet<String>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, slot: CacheSlot) -> &Option<GrantSet> {
        match slot {
            CacheSlot::User => &self.user,
            CacheSlot::UserGroups => &self.user_groups,
            CacheSlot::Group => &self.group,
        }
    }

    pub fn is_filled(&self, slot: CacheSlot) -> bool {
        self.slot(slot).is_some()
    }

    pub fn fill(&mut self, slot: CacheSlot, grants: &[Grant]) {
        let set = Some(GrantSet::from_grants(grants));
        match slot {
            CacheSlot::User => self.user = set,
            CacheSlot::UserGroups => self.user_groups = set,
            CacheSlot::Group => self.group = set,
        }
    }

    /// False for an unfilled slot.
    pub fn contains(&self, slot: CacheSlot, key: &GrantKey) -> bool {
        self.slot(slot).as_ref().is_some_and(|set| set.contains(key))
    }

    pub fn coarse(&self) -> Option<&HashSet<String>> {
        self.coarse.as_ref()
    }

    pub fn fill_coarse(&mut self, codenames: HashSet<String>) {
        self.coarse = Some(codenames);
    }

    /// Drop every fill; the next lookup re-queries the store.
    pub fn invalidate(&mut self) {
        self.user = None;
        self.user_groups = None;
        self.group = None;
        self.coarse = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, Subject};

    fn obj(id: &str) -> ObjectRef {
        ObjectRef::new(ContentType::new("auth", "user"), id)
    }

    fn grant(codename: &str, id: &str, approved: bool) -> Grant {
        Grant::new(
            codename.to_string(),
            &obj(id),
            &Subject::User("u1".to_string()),
            None,
            approved,
        )
        .unwrap()
    }

    #[test]
    fn test_fill_and_contains() {
        let mut cache = PermissionCache::new();
        assert!(!cache.is_filled(CacheSlot::User));

        cache.fill(CacheSlot::User, &[grant("x.delete", "1", true)]);
        assert!(cache.is_filled(CacheSlot::User));
        assert!(!cache.is_filled(CacheSlot::UserGroups));

        let key = GrantKey::new("x.delete", &obj("1"), true).unwrap();
        assert!(cache.contains(CacheSlot::User, &key));
        assert!(!cache.contains(CacheSlot::UserGroups, &key));

        let pending = GrantKey::new("x.delete", &obj("1"), false).unwrap();
        assert!(!cache.contains(CacheSlot::User, &pending));
    }

    #[test]
    fn test_invalidate_clears_all_slots() {
        let mut cache = PermissionCache::new();
        cache.fill(CacheSlot::User, &[]);
        cache.fill(CacheSlot::UserGroups, &[]);
        cache.fill_coarse(HashSet::new());

        cache.invalidate();
        assert!(!cache.is_filled(CacheSlot::User));
        assert!(!cache.is_filled(CacheSlot::UserGroups));
        assert!(cache.coarse().is_none());
    }

    #[test]
    fn test_rows_without_one_subject_are_skipped() {
        let key = GrantKey::new("x.delete", &obj("1"), true).unwrap();

        let mut orphan = grant("x.delete", "1", true);
        orphan.user_id = None;
        assert!(!GrantSet::from_grants(&[orphan]).contains(&key));

        let mut both = grant("x.delete", "1", true);
        both.group_id = Some("g1".to_string());
        assert!(!GrantSet::from_grants(&[both]).contains(&key));

        assert!(GrantSet::from_grants(&[grant("x.delete", "1", true)]).contains(&key));
    }

    #[test]
    fn test_unsaved_object_has_no_key() {
        let unsaved = ObjectRef::unsaved(ContentType::new("auth", "user"));
        assert!(GrantKey::new("x.delete", &unsaved, true).is_none());
    }
}
