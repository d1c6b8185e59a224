use crate::config::AuthorityConfig;
use crate::error::{AuthorityError, Result};
use crate::models::{Actor, ContentType, User};
use crate::permissions::requests::install_workflow_permissions;
use crate::permissions::{PermissionRegistry, Resolver};
use crate::store::{PermissionStore, SqliteStore};
use std::sync::Arc;

/// Everything a caller needs to answer permission questions: the store, the
/// registered permission sets and the cache policy.
pub struct Authority {
    pub store: Arc<SqliteStore>,

    pub registry: PermissionRegistry,

    /// Whether new resolvers memoize their grant lookups
    pub smart_cache: bool,
}

impl Authority {
    /// Open the configured database and register the configured sets.
    pub async fn open(config: &AuthorityConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.database_path).await?;
        Self::with_store(store, config).await
    }

    /// Build on an existing store. The content types of configured sets are
    /// registered so their models accept assignments.
    pub async fn with_store(store: SqliteStore, config: &AuthorityConfig) -> Result<Self> {
        install_workflow_permissions(&store).await?;

        let registry = PermissionRegistry::from_config(&config.permission_sets)?;
        for set in registry.permission_sets() {
            if let Some(model) = set.model() {
                store.register_content_type(model).await?;
            }
        }

        Ok(Self {
            store: Arc::new(store),
            registry,
            smart_cache: config.use_smart_cache,
        })
    }

    /// The store as the resolver sees it.
    pub fn permission_store(&self) -> Arc<dyn PermissionStore> {
        self.store.clone()
    }

    /// A resolver for the set labelled `label`, bound to `actor`.
    pub fn resolver_for(&self, label: &str, actor: Actor) -> Result<Resolver> {
        let set = self.registry.get_permission_by_label(label).ok_or_else(|| {
            AuthorityError::ImproperlyConfigured(format!("Unknown permission set {}", label))
        })?;

        Ok(Resolver::new(self.permission_store(), set)
            .with_actor(actor)
            .with_smart_cache(self.smart_cache))
    }

    /// Register a model so grants can be assigned on it.
    pub async fn add_model(&self, content_type: &ContentType) -> Result<()> {
        self.store.register_content_type(content_type).await
    }

    pub async fn find_user(&self, username: &str) -> Result<User> {
        self.store
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| AuthorityError::Config(format!("Unknown user {}", username)))
    }

    /// Look up a user by username, or a group by name.
    pub async fn find_actor(&self, user: Option<&str>, group: Option<&str>) -> Result<Actor> {
        if let Some(username) = user {
            return Ok(Actor::User(self.find_user(username).await?));
        }
        if let Some(name) = group {
            let group = self
                .store
                .get_group_by_name(name)
                .await?
                .ok_or_else(|| AuthorityError::Config(format!("Unknown group {}", name)))?;
            return Ok(Actor::Group(group));
        }
        Err(AuthorityError::MissingSubject)
    }
}
