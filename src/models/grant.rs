use super::{ObjectRef, Subject};
use crate::utils::now_utc;
use serde::{Deserialize, Serialize};

/// One row of the object permission table.
///
/// The same shape serves both granted permissions (`approved = true`) and
/// pending requests (`approved = false`). Rows are keyed by subject, target,
/// codename and approval state, but duplicates are allowed and readers only
/// ever ask whether at least one matching row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub grant_id: String,

    /// `<permission-set-label>.<check>`, e.g. "flatpage_permission.top_secret"
    pub codename: String,

    /// Content type label of the target ("app_label.model")
    pub content_type: String,

    pub object_id: String,

    /// Set for user grants. Malformed rows may carry neither subject.
    pub user_id: Option<String>,

    /// Set for group grants
    pub group_id: Option<String>,

    /// The user who created the grant or submitted the request
    pub creator: Option<String>,

    /// The user who approved the request
    pub approver: Option<String>,

    pub approved: bool,

    pub date_requested: String,

    pub date_approved: Option<String>,
}

impl Grant {
    /// Create a new grant row for a saved object.
    ///
    /// Returns None when the object has no identifier yet.
    pub fn new(
        codename: String,
        target: &ObjectRef,
        subject: &Subject,
        creator: Option<String>,
        approved: bool,
    ) -> Option<Self> {
        let object_id = target.object_id.clone()?;
        let (user_id, group_id) = match subject {
            Subject::User(id) => (Some(id.clone()), None),
            Subject::Group(id) => (None, Some(id.clone())),
        };
        let now = now_utc();

        Some(Self {
            grant_id: uuid::Uuid::new_v4().to_string(),
            codename,
            content_type: target.content_type.label(),
            object_id,
            user_id,
            group_id,
            creator,
            approver: None,
            approved,
            date_approved: approved.then(|| now.clone()),
            date_requested: now,
        })
    }

    /// The grant's holder, if the row is well formed.
    pub fn subject(&self) -> Option<Subject> {
        match (&self.user_id, &self.group_id) {
            (Some(user_id), None) => Some(Subject::User(user_id.clone())),
            (None, Some(group_id)) => Some(Subject::Group(group_id.clone())),
            _ => None,
        }
    }
}
