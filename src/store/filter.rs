use crate::models::ObjectRef;

/// Equality/membership predicates over the grant table.
///
/// Unset fields do not constrain the query. A `user_id` or `group_id`
/// predicate never matches rows whose corresponding column is NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrantFilter {
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    /// Rows held by any group the given user belongs to
    pub member_of: Option<String>,
    pub content_type: Option<String>,
    pub object_id: Option<String>,
    pub codename: Option<String>,
    pub approved: Option<bool>,
}

impl GrantFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn group(mut self, group_id: &str) -> Self {
        self.group_id = Some(group_id.to_string());
        self
    }

    pub fn groups_of(mut self, user_id: &str) -> Self {
        self.member_of = Some(user_id.to_string());
        self
    }

    /// Restrict to one object. Unsaved objects only constrain the content type.
    pub fn object(mut self, target: &ObjectRef) -> Self {
        self.content_type = Some(target.content_type.label());
        self.object_id = target.object_id.clone();
        self
    }

    pub fn codename(mut self, codename: &str) -> Self {
        self.codename = Some(codename.to_string());
        self
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = Some(approved);
        self
    }

    /// True when the filter asks for grants through group membership.
    pub fn is_group_membership(&self) -> bool {
        self.member_of.is_some()
    }
}
