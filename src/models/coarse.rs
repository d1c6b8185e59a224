use serde::{Deserialize, Serialize};

/// A model-level permission of the host application, e.g. `auth.add_user`.
///
/// These are attached to users or groups as a whole and say nothing about
/// individual objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoarsePermission {
    pub permission_id: String,

    /// Codename without the app label, e.g. "add_user"
    pub codename: String,

    pub name: String,

    /// Content type label ("app_label.model")
    pub content_type: String,
}

impl CoarsePermission {
    pub fn new(codename: String, name: String, content_type: String) -> Self {
        Self {
            permission_id: uuid::Uuid::new_v4().to_string(),
            codename,
            name,
            content_type,
        }
    }

    /// The `"app_label.codename"` form used by permission checks.
    pub fn full_codename(&self) -> String {
        let app_label = self
            .content_type
            .split_once('.')
            .map_or(self.content_type.as_str(), |(app, _)| app);
        format!("{}.{}", app_label, self.codename)
    }
}
