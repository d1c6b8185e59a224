//! Permission requests and their approval, plus authorized removal of grants.
//!
//! A request is a grant row with `approved = false`. Approving flips the flag
//! once; there is no way back to pending.

use super::resolver::{user_has_perm, Resolver};
use crate::error::{AuthorityError, Result};
use crate::models::{CoarsePermission, ContentType, Grant, ObjectRef, Target, User};
use crate::store::{GrantFilter, PermissionStore};
use crate::utils::now_utc;

/// Content type the workflow permissions hang off.
pub const WORKFLOW_APP_LABEL: &str = "authority";
pub const WORKFLOW_MODEL: &str = "permission";

pub const APPROVE_PERMISSION_REQUESTS: &str = "authority.approve_permission_requests";
pub const DELETE_FOREIGN_PERMISSIONS: &str = "authority.delete_foreign_permissions";
pub const CHANGE_FOREIGN_PERMISSIONS: &str = "authority.change_foreign_permissions";

pub fn workflow_content_type() -> ContentType {
    ContentType::new(WORKFLOW_APP_LABEL, WORKFLOW_MODEL)
}

/// Make sure the workflow permissions exist so they can be attached to users
/// and groups. Safe to call on every startup.
pub async fn install_workflow_permissions(
    store: &dyn PermissionStore,
) -> Result<Vec<CoarsePermission>> {
    let content_type = workflow_content_type();
    store.register_content_type(&content_type).await?;

    let mut perms = Vec::new();
    for (codename, name) in [
        ("approve_permission_requests", "Can approve permission requests"),
        ("delete_foreign_permissions", "Can delete foreign permissions"),
        ("change_foreign_permissions", "Can change foreign permissions"),
    ] {
        perms.push(
            store
                .get_or_create_coarse_permission(codename, name, &content_type)
                .await?,
        );
    }
    Ok(perms)
}

impl Resolver {
    /// File a pending request for `codename` on `target` for the bound subject.
    ///
    /// Rejected when the subject already holds the permission or already has
    /// a request pending for it.
    pub async fn request_perm(&mut self, codename: &str, target: &ObjectRef) -> Result<Grant> {
        let subject = self.subject().ok_or(AuthorityError::MissingSubject)?;
        self.validate_target(&Target::Instance(target.clone())).await?;

        if self.has_perm(codename, target, true, true).await?
            || self.requested_perm(codename, target, true).await?
        {
            log::warn!(
                "Rejected request for {} on {} by {}",
                codename,
                target,
                self.subject_name()
            );
            return Err(AuthorityError::AlreadyHasPermission {
                subject: self.subject_name(),
                codename: codename.to_string(),
                target: target.to_string(),
            });
        }

        let creator = self.user().map(|u| u.user_id.clone());
        let grant = Grant::new(codename.to_string(), target, &subject, creator, false)
            .ok_or_else(|| AuthorityError::UnsavedModelInstance(target.to_string()))?;
        self.store().insert_grant(&grant).await?;
        log::info!("Requested {} on {} for {:?}", codename, target, subject);

        // The new row must count as pending for later checks on this resolver.
        self.invalidate_permissions_cache();
        Ok(grant)
    }
}

/// Approve a pending request.
pub async fn approve(store: &dyn PermissionStore, grant_id: &str, approver: &User) -> Result<Grant> {
    let mut grant = store
        .get_grant(grant_id)
        .await?
        .ok_or_else(|| AuthorityError::GrantNotFound(grant_id.to_string()))?;

    if !user_has_perm(store, approver, APPROVE_PERMISSION_REQUESTS).await? {
        log::warn!("{} may not approve {}", approver.username, grant_id);
        return Err(AuthorityError::PermissionDenied(format!(
            "{} cannot approve permission requests",
            approver.username
        )));
    }

    if grant.approved {
        return Err(AuthorityError::InvalidTransition(format!(
            "{} is already approved",
            grant_id
        )));
    }

    let now = now_utc();
    if !store.approve_grant(grant_id, &approver.user_id, &now).await? {
        // Someone else approved or removed it in between.
        return Err(AuthorityError::InvalidTransition(format!(
            "{} is no longer pending",
            grant_id
        )));
    }

    grant.approved = true;
    grant.approver = Some(approver.user_id.clone());
    grant.date_approved = Some(now);
    log::info!("{} approved {} ({})", approver.username, grant.codename, grant_id);
    Ok(grant)
}

/// Remove a grant or request. Allowed for its creator and for holders of the
/// delete-foreign permission.
pub async fn delete_grant(store: &dyn PermissionStore, grant_id: &str, actor: &User) -> Result<Grant> {
    let grant = store
        .get_grant(grant_id)
        .await?
        .ok_or_else(|| AuthorityError::GrantNotFound(grant_id.to_string()))?;

    let is_creator = actor.is_active && grant.creator.as_deref() == Some(actor.user_id.as_str());
    if !is_creator && !user_has_perm(store, actor, DELETE_FOREIGN_PERMISSIONS).await? {
        log::warn!("{} may not delete {}", actor.username, grant_id);
        return Err(AuthorityError::PermissionDenied(format!(
            "{} cannot delete permissions created by others",
            actor.username
        )));
    }

    if !store.delete_grant(grant_id).await? {
        return Err(AuthorityError::GrantNotFound(grant_id.to_string()));
    }
    log::info!("{} deleted {} ({})", actor.username, grant.codename, grant_id);
    Ok(grant)
}

/// Every grant and request on one object, oldest first.
pub async fn permissions_for_object(
    store: &dyn PermissionStore,
    target: &ObjectRef,
) -> Result<Vec<Grant>> {
    if !target.is_saved() {
        return Ok(Vec::new());
    }
    store.filter_grants(&GrantFilter::new().object(target)).await
}

/// The grants on an object that `viewer` may manage: all of them with the
/// change-foreign permission, otherwise only the ones the viewer created.
pub async fn manageable_permissions_for_object(
    store: &dyn PermissionStore,
    target: &ObjectRef,
    viewer: &User,
) -> Result<Vec<Grant>> {
    let grants = permissions_for_object(store, target).await?;
    if user_has_perm(store, viewer, CHANGE_FOREIGN_PERMISSIONS).await? {
        return Ok(grants);
    }
    Ok(grants
        .into_iter()
        .filter(|grant| grant.creator.as_deref() == Some(viewer.user_id.as_str()))
        .collect())
}
