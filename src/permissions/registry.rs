use super::core::PermissionSet;
use super::resolver::Resolver;
use crate::config::{CheckConfig, PermissionSetConfig};
use crate::error::{AuthorityError, Result};
use crate::models::{Actor, ContentType, Target};
use crate::store::PermissionStore;
use std::sync::Arc;

/// A check resolved from a `"<label>.<check>"` signature, ready to run for
/// one actor.
pub struct BoundCheck {
    name: String,
    resolver: Resolver,
}

impl BoundCheck {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub async fn call(&mut self, targets: &[Target]) -> Result<bool> {
        self.resolver.check(&self.name, targets).await
    }
}

/// Registry of permission sets.
///
/// Sets are registered once at startup and looked up by label. Registration
/// order is preserved for choice listings.
pub struct PermissionRegistry {
    sets: Vec<Arc<PermissionSet>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self { sets: Vec::new() }
    }

    /// Build a registry from declarative configuration.
    pub fn from_config(configs: &[PermissionSetConfig]) -> Result<Self> {
        let mut registry = Self::new();

        for config in configs {
            let mut set = PermissionSet::new(&config.name);
            if let Some(label) = &config.label {
                set = set.with_label(label);
            }
            for check in &config.checks {
                set = match check {
                    CheckConfig::Name(name) => set.with_check(name),
                    CheckConfig::Detailed {
                        name,
                        verbose_name: Some(verbose),
                    } => set.with_verbose_check(name, verbose),
                    CheckConfig::Detailed { name, .. } => set.with_check(name),
                };
            }

            let model = match &config.model {
                Some(label) => Some(ContentType::parse(label).ok_or_else(|| {
                    AuthorityError::ImproperlyConfigured(format!(
                        "{} is not a valid model label for {}",
                        label, config.name
                    ))
                })?),
                None => None,
            };
            registry.register(model, set)?;
        }

        Ok(registry)
    }

    /// Register a permission set for a model.
    ///
    /// The model argument takes precedence over one set on the permission set.
    pub fn register(
        &mut self,
        model: Option<ContentType>,
        mut set: PermissionSet,
    ) -> Result<Arc<PermissionSet>> {
        let model = model.or_else(|| set.model().cloned()).ok_or_else(|| {
            AuthorityError::ImproperlyConfigured(format!(
                "Permission set {} needs a model",
                set.label()
            ))
        })?;

        if let Some(existing) = self.get_permission_by_label(set.label()) {
            return Err(if existing.model() == Some(&model) {
                AuthorityError::AlreadyRegistered(set.label().to_string())
            } else {
                AuthorityError::ImproperlyConfigured(format!(
                    "The name of {} conflicts with {}",
                    set.label(),
                    existing.name()
                ))
            });
        }

        set.set_model(model);
        let set = Arc::new(set);
        log::debug!("Registered permission set {}", set.label());
        self.sets.push(set.clone());
        Ok(set)
    }

    pub fn get_permission_by_label(&self, label: &str) -> Option<Arc<PermissionSet>> {
        self.sets.iter().find(|set| set.label() == label).cloned()
    }

    /// Every registered set, in registration order.
    pub fn permission_sets(&self) -> &[Arc<PermissionSet>] {
        &self.sets
    }

    /// Sets registered for a content type, in registration order.
    pub fn sets_for(&self, content_type: &ContentType) -> Vec<Arc<PermissionSet>> {
        self.sets
            .iter()
            .filter(|set| set.model() == Some(content_type))
            .cloned()
            .collect()
    }

    /// `(signature, verbose label)` for every check of every set registered
    /// against the target's model.
    pub fn get_choices_for(&self, target: &Target) -> Vec<(String, String)> {
        self.sets_for(target.content_type())
            .iter()
            .flat_map(|set| set.choices())
            .collect()
    }

    /// Resolve `"<label>.<check>"` into a check bound to `actor`.
    ///
    /// Returns None for a signature without a `.`, an unknown label or an
    /// unknown check; callers treat that as denial.
    pub fn get_check(
        &self,
        store: Arc<dyn PermissionStore>,
        actor: Actor,
        signature: &str,
    ) -> Option<BoundCheck> {
        let (label, check_name) = signature.split_once('.')?;
        let set = self.get_permission_by_label(label)?;
        set.find_check(check_name)?;

        Some(BoundCheck {
            name: check_name.to_string(),
            resolver: Resolver::new(store, set).with_actor(actor),
        })
    }
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
