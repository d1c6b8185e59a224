mod coarse;
mod grant;
mod subject;
mod target;

pub use coarse::CoarsePermission;
pub use grant::Grant;
pub use subject::{Actor, Group, Subject, User};
pub use target::{ContentType, ObjectRef, Target};
