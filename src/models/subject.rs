use serde::{Deserialize, Serialize};

/// A user account as seen by the permission system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    /// Create an active, non-superuser account with a fresh id.
    pub fn new(username: String) -> Self {
        Self {
            user_id: uuid::Uuid::new_v4().to_string(),
            username,
            is_active: true,
            is_superuser: false,
        }
    }

    pub fn superuser(username: String) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(username)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: String,
    pub name: String,
}

impl Group {
    pub fn new(name: String) -> Self {
        Self {
            group_id: uuid::Uuid::new_v4().to_string(),
            name,
        }
    }
}

/// The holder of a grant row: exactly one of a user or a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    User(String),
    Group(String),
}

/// Whoever a bound check is evaluated for.
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    User(User),
    Group(Group),
}

impl From<User> for Actor {
    fn from(user: User) -> Self {
        Actor::User(user)
    }
}

impl From<Group> for Actor {
    fn from(group: Group) -> Self {
        Actor::Group(group)
    }
}
