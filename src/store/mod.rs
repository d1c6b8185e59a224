//! Persistence for grants and the host-side records the resolver consults.
//!
//! The resolver only ever talks to [`PermissionStore`]; [`SqliteStore`] is the
//! sqlx-backed implementation used by the CLI and the tests.

mod filter;
mod sqlite;

pub use filter::GrantFilter;
pub use sqlite::{QueryStats, SqliteStore};

use crate::error::Result;
use crate::models::{CoarsePermission, ContentType, Grant, Group, Subject, User};
use async_trait::async_trait;

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Make a content type known. Grants can only be assigned on known types.
    async fn register_content_type(&self, content_type: &ContentType) -> Result<()>;

    async fn content_type_exists(&self, content_type: &ContentType) -> Result<bool>;

    async fn create_user(&self, user: &User) -> Result<()>;

    /// Persist `is_active` / `is_superuser` / `username` changes.
    async fn update_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn create_group(&self, group: &Group) -> Result<()>;

    async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>>;

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<()>;

    async fn insert_grant(&self, grant: &Grant) -> Result<()>;

    async fn get_grant(&self, grant_id: &str) -> Result<Option<Grant>>;

    /// All grant rows matching every set field of the filter, oldest first.
    async fn filter_grants(&self, filter: &GrantFilter) -> Result<Vec<Grant>>;

    /// Flip a pending request to approved. Returns false if no pending row matched.
    async fn approve_grant(&self, grant_id: &str, approver: &str, date_approved: &str)
        -> Result<bool>;

    /// Remove a grant row. Returns false if it did not exist.
    async fn delete_grant(&self, grant_id: &str) -> Result<bool>;

    /// Fetch a coarse permission by (content type, codename), creating it if missing.
    async fn get_or_create_coarse_permission(
        &self,
        codename: &str,
        name: &str,
        content_type: &ContentType,
    ) -> Result<CoarsePermission>;

    /// Attach a coarse permission to a user or a group. Attaching twice is a no-op.
    async fn attach_coarse_permission(&self, subject: &Subject, permission_id: &str)
        -> Result<()>;

    /// Coarse permissions held by a user directly or through any of their groups.
    async fn coarse_permissions_for_user(&self, user_id: &str) -> Result<Vec<CoarsePermission>>;
}
