use super::cache::{CacheSlot, GrantKey, PermissionCache};
use super::core::PermissionSet;
use crate::error::{AuthorityError, Result};
use crate::models::{
    Actor, CoarsePermission, ContentType, Grant, Group, ObjectRef, Subject, Target, User,
};
use crate::store::{GrantFilter, PermissionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// What `assign` created or reused for one (target, check) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assigned {
    /// A model-level permission attached to the subject
    Coarse(CoarsePermission),
    /// An approved per-object grant
    Object(Grant),
}

/// Host-side `user.has_perm(perm)` for a coarse `"app.codename"` permission.
///
/// Inactive users hold nothing; active superusers hold everything.
pub async fn user_has_perm(store: &dyn PermissionStore, user: &User, perm: &str) -> Result<bool> {
    if !user.is_active {
        return Ok(false);
    }
    if user.is_superuser {
        return Ok(true);
    }

    let perms = store.coarse_permissions_for_user(&user.user_id).await?;
    Ok(perms.iter().any(|p| p.full_codename() == perm))
}

/// Answers permission questions for one permission set, bound to a user
/// and/or a group.
///
/// Grant lookups go through a lazy [`PermissionCache`] that lives as long as
/// the resolver. Writes made elsewhere (including through `assign`) are not
/// seen until [`invalidate_permissions_cache`](Self::invalidate_permissions_cache).
pub struct Resolver {
    store: Arc<dyn PermissionStore>,
    set: Arc<PermissionSet>,
    user: Option<User>,
    group: Option<Group>,
    cache: PermissionCache,
    smart_cache: bool,
}

impl Resolver {
    pub fn new(store: Arc<dyn PermissionStore>, set: Arc<PermissionSet>) -> Self {
        Self {
            store,
            set,
            user: None,
            group: None,
            cache: PermissionCache::new(),
            smart_cache: true,
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_actor(self, actor: Actor) -> Self {
        match actor {
            Actor::User(user) => self.with_user(user),
            Actor::Group(group) => self.with_group(group),
        }
    }

    /// When disabled, every lookup runs its own targeted store query.
    pub fn with_smart_cache(mut self, enabled: bool) -> Self {
        self.set_smart_cache(enabled);
        self
    }

    /// Switching modes drops whatever was cached.
    pub fn set_smart_cache(&mut self, enabled: bool) {
        self.smart_cache = enabled;
        self.cache.invalidate();
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    pub fn permission_set(&self) -> &Arc<PermissionSet> {
        &self.set
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    /// The grant holder for writes: the bound user, else the bound group.
    pub fn subject(&self) -> Option<Subject> {
        match (&self.user, &self.group) {
            (Some(user), _) => Some(Subject::User(user.user_id.clone())),
            (None, Some(group)) => Some(Subject::Group(group.group_id.clone())),
            (None, None) => None,
        }
    }

    /// Human-readable name of the bound subject, for messages.
    pub(crate) fn subject_name(&self) -> String {
        match (&self.user, &self.group) {
            (Some(user), _) => user.username.clone(),
            (None, Some(group)) => group.name.clone(),
            (None, None) => String::new(),
        }
    }

    fn slot_filter(slot: CacheSlot, subject_id: &str) -> GrantFilter {
        match slot {
            CacheSlot::User => GrantFilter::new().user(subject_id),
            CacheSlot::UserGroups => GrantFilter::new().groups_of(subject_id),
            CacheSlot::Group => GrantFilter::new().group(subject_id),
        }
    }

    async fn lookup(&mut self, slot: CacheSlot, subject_id: &str, key: &GrantKey) -> Result<bool> {
        if self.smart_cache {
            if !self.cache.is_filled(slot) {
                let grants = self
                    .store
                    .filter_grants(&Self::slot_filter(slot, subject_id))
                    .await?;
                log::debug!(
                    "Filled {:?} permission cache for {} ({} rows)",
                    slot,
                    subject_id,
                    grants.len()
                );
                self.cache.fill(slot, &grants);
            }
            return Ok(self.cache.contains(slot, key));
        }

        let mut filter = Self::slot_filter(slot, subject_id)
            .codename(&key.codename)
            .approved(key.approved);
        filter.content_type = Some(key.content_type.clone());
        filter.object_id = Some(key.object_id.clone());

        let grants = self.store.filter_grants(&filter).await?;
        Ok(grants.iter().any(|g| g.subject().is_some()))
    }

    /// Whether the bound user holds `codename` on `target`, directly or
    /// (with `check_groups`) through one of their groups.
    pub async fn has_user_perms(
        &mut self,
        codename: &str,
        target: &ObjectRef,
        approved: bool,
        check_groups: bool,
    ) -> Result<bool> {
        let user_id = match &self.user {
            None => return Ok(false),
            Some(user) if user.is_superuser => return Ok(true),
            Some(user) if !user.is_active => return Ok(false),
            Some(user) => user.user_id.clone(),
        };
        let Some(key) = GrantKey::new(codename, target, approved) else {
            return Ok(false);
        };

        if self.lookup(CacheSlot::User, &user_id, &key).await? {
            return Ok(true);
        }
        if check_groups && self.lookup(CacheSlot::UserGroups, &user_id, &key).await? {
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether the bound group holds `codename` on `target`.
    pub async fn has_group_perms(
        &mut self,
        codename: &str,
        target: &ObjectRef,
        approved: bool,
    ) -> Result<bool> {
        let Some(group_id) = self.group.as_ref().map(|g| g.group_id.clone()) else {
            return Ok(false);
        };
        let Some(key) = GrantKey::new(codename, target, approved) else {
            return Ok(false);
        };
        self.lookup(CacheSlot::Group, &group_id, &key).await
    }

    /// User lookup when a user is bound, else group lookup when a group is bound.
    pub async fn has_perm(
        &mut self,
        codename: &str,
        target: &ObjectRef,
        check_groups: bool,
        approved: bool,
    ) -> Result<bool> {
        if self.user.is_some() {
            return self
                .has_user_perms(codename, target, approved, check_groups)
                .await;
        }
        if self.group.is_some() {
            return self.has_group_perms(codename, target, approved).await;
        }
        Ok(false)
    }

    /// Whether a pending request exists for `codename` on `target`.
    pub async fn requested_perm(
        &mut self,
        codename: &str,
        target: &ObjectRef,
        check_groups: bool,
    ) -> Result<bool> {
        self.has_perm(codename, target, check_groups, false).await
    }

    /// Coarse `"app.codename"` permission of the bound user.
    pub async fn user_has_coarse_perm(&mut self, perm: &str) -> Result<bool> {
        let user = match &self.user {
            None => return Ok(false),
            Some(user) if !user.is_active => return Ok(false),
            Some(user) if user.is_superuser => return Ok(true),
            Some(user) => user.clone(),
        };

        if !self.smart_cache {
            return user_has_perm(self.store.as_ref(), &user, perm).await;
        }

        if self.cache.coarse().is_none() {
            let codenames: HashSet<String> = self
                .store
                .coarse_permissions_for_user(&user.user_id)
                .await?
                .iter()
                .map(CoarsePermission::full_codename)
                .collect();
            log::debug!(
                "Filled coarse permission cache for {} ({} permissions)",
                user.user_id,
                codenames.len()
            );
            self.cache.fill_coarse(codenames);
        }
        Ok(self.cache.coarse().is_some_and(|perms| perms.contains(perm)))
    }

    /// The default check algorithm.
    ///
    /// Without targets, checks against the set's model. For each target the
    /// coarse permission is consulted (when a user is bound) and, for
    /// instances of the set's model, the per-object grant. Any target
    /// granting is enough.
    pub async fn can(&mut self, check: &str, generic: bool, targets: &[Target]) -> Result<bool> {
        let model = self.set.model().cloned();
        let defaults;
        let targets = if targets.is_empty() {
            match &model {
                Some(model) => {
                    defaults = [Target::Model(model.clone())];
                    &defaults[..]
                }
                None => return Ok(false),
            }
        } else {
            targets
        };

        let mut granted = false;
        for target in targets {
            if self.user.is_some() {
                let perm = self.get_coarse_codename(check, target.content_type(), generic, false);
                granted = granted || self.user_has_coarse_perm(&perm).await?;
            }

            let Some(obj) = target.as_instance() else {
                continue;
            };
            if model.as_ref() == Some(&obj.content_type) {
                let codename = self.get_codename(check, &obj.content_type, generic);
                granted = granted || self.has_perm(&codename, obj, true, true).await?;
            }
        }
        Ok(granted)
    }

    /// Run a check by name: `<check>` or `<check>_<model>`.
    ///
    /// Custom evaluators replace `can`. Unknown names are denied.
    pub async fn check(&mut self, name: &str, targets: &[Target]) -> Result<bool> {
        let Some(resolved) = self.set.find_check(name) else {
            log::debug!("Unknown check {} on {}", name, self.set.label());
            return Ok(false);
        };

        match resolved.evaluator {
            Some(evaluator) => evaluator.evaluate(self, targets).await,
            None => self.can(&resolved.check, resolved.generic, targets).await,
        }
    }

    /// Reject targets whose content type is unknown or that are unsaved.
    pub(crate) async fn validate_target(&self, target: &Target) -> Result<()> {
        let content_type = target.content_type();
        if !self.store.content_type_exists(content_type).await? {
            return Err(AuthorityError::NotAModel(content_type.label()));
        }
        if let Target::Instance(obj) = target {
            if !obj.is_saved() {
                return Err(AuthorityError::UnsavedModelInstance(obj.to_string()));
            }
        }
        Ok(())
    }

    /// Grant checks on targets to the bound subject.
    ///
    /// Empty `checks` means every check of the set; empty `targets` means the
    /// set's model. Class-level targets get a coarse permission attached,
    /// instances get an approved per-object grant (an existing one is reused).
    /// Every target is validated before anything is written. The cache is
    /// left as is.
    pub async fn assign(
        &mut self,
        checks: &[&str],
        targets: &[Target],
        generic: bool,
    ) -> Result<Vec<Assigned>> {
        let subject = self.subject().ok_or(AuthorityError::MissingSubject)?;

        let targets: Vec<Target> = if targets.is_empty() {
            let model = self.set.model().cloned().ok_or_else(|| {
                AuthorityError::ImproperlyConfigured(format!(
                    "{} has no model to assign on",
                    self.set.label()
                ))
            })?;
            vec![Target::Model(model)]
        } else {
            targets.to_vec()
        };
        let checks: Vec<String> = if checks.is_empty() {
            self.set.check_names()
        } else {
            checks.iter().map(|check| check.to_lowercase()).collect()
        };

        for target in &targets {
            self.validate_target(target).await?;
        }

        let creator = self.user.as_ref().map(|u| u.user_id.clone());
        let mut result = Vec::with_capacity(targets.len() * checks.len());

        for target in &targets {
            for check in &checks {
                let assigned = match target {
                    Target::Instance(obj) => {
                        let codename = self.get_codename(check, &obj.content_type, generic);
                        Assigned::Object(
                            self.assign_object(&subject, &codename, obj, creator.clone())
                                .await?,
                        )
                    }
                    Target::Model(content_type) => {
                        let codename =
                            self.get_coarse_codename(check, content_type, generic, true);
                        let name = check.split_once('_').map_or(check.as_str(), |(head, _)| head);
                        let perm = self
                            .store
                            .get_or_create_coarse_permission(&codename, name, content_type)
                            .await?;
                        self.store
                            .attach_coarse_permission(&subject, &perm.permission_id)
                            .await?;
                        Assigned::Coarse(perm)
                    }
                };
                result.push(assigned);
            }
        }

        Ok(result)
    }

    async fn assign_object(
        &self,
        subject: &Subject,
        codename: &str,
        obj: &ObjectRef,
        creator: Option<String>,
    ) -> Result<Grant> {
        let filter = GrantFilter::new().object(obj).codename(codename).approved(true);
        let filter = match subject {
            Subject::User(id) => filter.user(id),
            Subject::Group(id) => filter.group(id),
        };

        if let Some(existing) = self.store.filter_grants(&filter).await?.into_iter().next() {
            return Ok(existing);
        }

        let grant = Grant::new(codename.to_string(), obj, subject, creator, true)
            .ok_or_else(|| AuthorityError::UnsavedModelInstance(obj.to_string()))?;
        self.store.insert_grant(&grant).await?;
        log::info!("Granted {} on {} to {:?}", codename, obj, subject);
        Ok(grant)
    }

    /// `"<label>.<check>"`, suffixed with `"_<model>"` when generic.
    pub fn get_codename(&self, check: &str, content_type: &ContentType, generic: bool) -> String {
        let perm = format!("{}.{}", self.set.label(), check.to_lowercase());
        if generic {
            format!("{}_{}", perm, content_type.model)
        } else {
            perm
        }
    }

    /// `"<app>.<check>"` (or just `"<check>"`), suffixed with `"_<model>"` when generic.
    pub fn get_coarse_codename(
        &self,
        check: &str,
        content_type: &ContentType,
        generic: bool,
        without_app_label: bool,
    ) -> String {
        let perm = if without_app_label {
            check.to_string()
        } else {
            format!("{}.{}", content_type.app_label, check.to_lowercase())
        };
        if generic {
            format!("{}_{}", perm, content_type.model)
        } else {
            perm
        }
    }

    pub fn invalidate_permissions_cache(&mut self) {
        log::debug!("Invalidated permission cache for {}", self.set.label());
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    async fn setup() -> (Arc<dyn PermissionStore>, Arc<PermissionSet>) {
        let store = SqliteStore::open(":memory:").await.unwrap();
        let user_ct = ContentType::new("auth", "user");
        store.register_content_type(&user_ct).await.unwrap();
        let set = PermissionSet::new("user").for_model(user_ct);
        (Arc::new(store), Arc::new(set))
    }

    #[test]
    fn test_codenames() {
        let store: Arc<dyn PermissionStore> = Arc::new(NoStore);
        let set = Arc::new(PermissionSet::new("FlatPage"));
        let resolver = Resolver::new(store, set);
        let ct = ContentType::new("flatpages", "FlatPage");

        assert_eq!(
            resolver.get_codename("Top_Secret", &ct, false),
            "flatpage_permission.top_secret"
        );
        assert_eq!(
            resolver.get_codename("delete", &ct, true),
            "flatpage_permission.delete_flatpage"
        );
        assert_eq!(
            resolver.get_coarse_codename("add", &ct, true, false),
            "flatpages.add_flatpage"
        );
        assert_eq!(resolver.get_coarse_codename("add", &ct, false, true), "add");
    }

    #[tokio::test]
    async fn test_unbound_resolver_denies_and_cannot_assign() {
        let (store, set) = setup().await;
        let mut resolver = Resolver::new(store, set);
        let obj = ObjectRef::new(ContentType::new("auth", "user"), "1");

        assert!(!resolver.has_perm("user_permission.delete", &obj, true, true).await.unwrap());
        assert!(!resolver.can("delete", false, &[]).await.unwrap());
        assert!(matches!(
            resolver.assign(&["delete"], &[], false).await,
            Err(AuthorityError::MissingSubject)
        ));
    }

    #[tokio::test]
    async fn test_assign_class_level_gives_coarse_permission() {
        let (store, set) = setup().await;
        let user = User::new("alice".to_string());
        store.create_user(&user).await.unwrap();
        let mut resolver = Resolver::new(store, set).with_user(user);

        let assigned = resolver.assign(&["add"], &[], true).await.unwrap();
        match &assigned[..] {
            [Assigned::Coarse(perm)] => {
                assert_eq!(perm.codename, "add_user");
                assert_eq!(perm.name, "add");
                assert_eq!(perm.full_codename(), "auth.add_user");
            }
            other => panic!("unexpected assignment: {:?}", other),
        }

        assert!(resolver.can("add", true, &[]).await.unwrap());
        assert!(!resolver.can("add", false, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_group_only_resolver() {
        let (store, set) = setup().await;
        let group = Group::new("editors".to_string());
        store.create_group(&group).await.unwrap();
        let mut resolver = Resolver::new(store, set).with_group(group);
        let obj = ObjectRef::new(ContentType::new("auth", "user"), "1");

        resolver
            .assign(&["browse"], &[Target::Instance(obj.clone())], false)
            .await
            .unwrap();
        assert!(resolver
            .has_perm("user_permission.browse", &obj, true, true)
            .await
            .unwrap());
        assert!(!resolver
            .has_perm("user_permission.change", &obj, true, true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_smart_cache_disabled_sees_new_grants() {
        let (store, set) = setup().await;
        let user = User::new("alice".to_string());
        store.create_user(&user).await.unwrap();
        let obj = ObjectRef::new(ContentType::new("auth", "user"), "1");
        let mut resolver = Resolver::new(store, set).with_user(user).with_smart_cache(false);

        assert!(!resolver
            .has_perm("user_permission.delete", &obj, false, true)
            .await
            .unwrap());
        resolver
            .assign(&["delete"], &[Target::Instance(obj.clone())], false)
            .await
            .unwrap();
        // No invalidation needed without the cache.
        assert!(resolver
            .has_perm("user_permission.delete", &obj, false, true)
            .await
            .unwrap());
    }

    /// A store nothing should reach; used for pure codename tests.
    struct NoStore;

    #[async_trait::async_trait]
    impl PermissionStore for NoStore {
        async fn register_content_type(&self, _: &ContentType) -> Result<()> {
            unreachable!()
        }
        async fn content_type_exists(&self, _: &ContentType) -> Result<bool> {
            unreachable!()
        }
        async fn create_user(&self, _: &User) -> Result<()> {
            unreachable!()
        }
        async fn update_user(&self, _: &User) -> Result<()> {
            unreachable!()
        }
        async fn get_user(&self, _: &str) -> Result<Option<User>> {
            unreachable!()
        }
        async fn get_user_by_username(&self, _: &str) -> Result<Option<User>> {
            unreachable!()
        }
        async fn create_group(&self, _: &Group) -> Result<()> {
            unreachable!()
        }
        async fn get_group_by_name(&self, _: &str) -> Result<Option<Group>> {
            unreachable!()
        }
        async fn add_user_to_group(&self, _: &str, _: &str) -> Result<()> {
            unreachable!()
        }
        async fn insert_grant(&self, _: &Grant) -> Result<()> {
            unreachable!()
        }
        async fn get_grant(&self, _: &str) -> Result<Option<Grant>> {
            unreachable!()
        }
        async fn filter_grants(&self, _: &GrantFilter) -> Result<Vec<Grant>> {
            unreachable!()
        }
        async fn approve_grant(&self, _: &str, _: &str, _: &str) -> Result<bool> {
            unreachable!()
        }
        async fn delete_grant(&self, _: &str) -> Result<bool> {
            unreachable!()
        }
        async fn get_or_create_coarse_permission(
            &self,
            _: &str,
            _: &str,
            _: &ContentType,
        ) -> Result<CoarsePermission> {
            unreachable!()
        }
        async fn attach_coarse_permission(&self, _: &Subject, _: &str) -> Result<()> {
            unreachable!()
        }
        async fn coarse_permissions_for_user(&self, _: &str) -> Result<Vec<CoarsePermission>> {
            unreachable!()
        }
    }
}
