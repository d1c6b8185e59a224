pub mod config;
pub mod error;
pub mod models;
pub mod permissions;
pub mod state;
pub mod store;
pub mod utils;

pub use error::{AuthorityError, Result};
pub use permissions::{PermissionRegistry, PermissionSet, Resolver};
pub use state::Authority;
pub use store::{PermissionStore, SqliteStore};
