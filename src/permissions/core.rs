use super::resolver::Resolver;
use crate::error::Result;
use crate::models::{ContentType, Target};
use crate::utils::slugify;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Checks every permission set exposes, in this order.
pub const GENERIC_CHECKS: [&str; 4] = ["add", "browse", "change", "delete"];

/// A custom evaluator that replaces the default `can` algorithm for one check.
///
/// The resolver is handed in so the evaluator can reuse its cache and helpers
/// (`has_perm`, `can`, the bound user).
#[async_trait]
pub trait CustomCheck: Send + Sync {
    async fn evaluate(&self, resolver: &mut Resolver, targets: &[Target]) -> Result<bool>;
}

/// One declared custom check.
#[derive(Clone)]
pub struct CheckDecl {
    pub name: String,
    pub verbose_name: Option<String>,
    pub evaluator: Option<Arc<dyn CustomCheck>>,
}

impl fmt::Debug for CheckDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckDecl")
            .field("name", &self.name)
            .field("verbose_name", &self.verbose_name)
            .field("evaluator", &self.evaluator.is_some())
            .finish()
    }
}

/// A check name resolved against a permission set.
#[derive(Clone)]
pub struct ResolvedCheck {
    /// Base check name, without any model suffix
    pub check: String,
    /// True when reached through the `<check>_<model>` name
    pub generic: bool,
    pub evaluator: Option<Arc<dyn CustomCheck>>,
}

/// A named collection of checks for one content type.
///
/// Built with the chained `with_*` methods and handed to
/// [`PermissionRegistry::register`](super::PermissionRegistry::register),
/// which binds the model.
#[derive(Debug, Clone)]
pub struct PermissionSet {
    name: String,
    label: String,
    model: Option<ContentType>,
    checks: Vec<CheckDecl>,
}

impl PermissionSet {
    /// Create a set whose label is derived as `"<name>_permission"`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: slugify(&format!("{}_permission", name)),
            model: None,
            checks: Vec::new(),
        }
    }

    /// Override the derived label. The label is slugified either way.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = slugify(label);
        self
    }

    pub fn for_model(mut self, model: ContentType) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_check(self, name: &str) -> Self {
        self.push_check(name, None, None)
    }

    pub fn with_verbose_check(self, name: &str, verbose_name: &str) -> Self {
        self.push_check(name, Some(verbose_name.to_string()), None)
    }

    pub fn with_custom_check(self, name: &str, evaluator: Arc<dyn CustomCheck>) -> Self {
        self.push_check(name, None, Some(evaluator))
    }

    fn push_check(
        mut self,
        name: &str,
        verbose_name: Option<String>,
        evaluator: Option<Arc<dyn CustomCheck>>,
    ) -> Self {
        self.checks.push(CheckDecl {
            name: name.to_lowercase(),
            verbose_name,
            evaluator,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn model(&self) -> Option<&ContentType> {
        self.model.as_ref()
    }

    pub(crate) fn set_model(&mut self, model: ContentType) {
        self.model = Some(model);
    }

    /// Generic checks first, then custom checks in declaration order.
    pub fn check_names(&self) -> Vec<String> {
        let mut names: Vec<String> = GENERIC_CHECKS.iter().map(|c| c.to_string()).collect();
        for decl in &self.checks {
            if !names.contains(&decl.name) {
                names.push(decl.name.clone());
            }
        }
        names
    }

    fn decl(&self, name: &str) -> Option<&CheckDecl> {
        self.checks.iter().find(|decl| decl.name == name)
    }

    fn is_declared(&self, name: &str) -> bool {
        GENERIC_CHECKS.contains(&name) || self.decl(name).is_some()
    }

    /// Resolve a check name as `<check>` or `<check>_<model>`.
    ///
    /// A declared name always wins over the suffixed reading.
    pub fn find_check(&self, name: &str) -> Option<ResolvedCheck> {
        let name = name.to_lowercase();

        if self.is_declared(&name) {
            return Some(ResolvedCheck {
                evaluator: self.decl(&name).and_then(|decl| decl.evaluator.clone()),
                check: name,
                generic: false,
            });
        }

        let model = self.model.as_ref()?;
        let check = name.strip_suffix(&format!("_{}", model.model))?;
        if self.is_declared(check) {
            return Some(ResolvedCheck {
                check: check.to_string(),
                generic: true,
                evaluator: None,
            });
        }

        None
    }

    /// `(signature, verbose label)` pairs for every check, generic ones first.
    pub fn choices(&self) -> Vec<(String, String)> {
        let model = self
            .model
            .as_ref()
            .map_or_else(|| self.name.to_lowercase(), |ct| ct.model.clone());

        self.check_names()
            .into_iter()
            .map(|check| {
                let signature = format!("{}.{}", self.label, check);
                let verbose = if GENERIC_CHECKS.contains(&check.as_str()) {
                    format!("Can {} this {}", check, model)
                } else {
                    self.decl(&check)
                        .and_then(|decl| decl.verbose_name.clone())
                        .unwrap_or_else(|| signature.clone())
                };
                (signature, verbose)
            })
            .collect()
    }
}
