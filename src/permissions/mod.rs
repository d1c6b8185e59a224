pub mod cache;
pub mod core;
pub mod registry;
pub mod requests;
pub mod resolver;

pub use cache::{CacheSlot, GrantKey, PermissionCache};
pub use core::{CheckDecl, CustomCheck, PermissionSet, ResolvedCheck, GENERIC_CHECKS};
pub use registry::{BoundCheck, PermissionRegistry};
pub use resolver::{user_has_perm, Assigned, Resolver};
