/// Utility modules shared by the store and the resolver.
pub mod slug;
pub mod time;

pub use slug::slugify;
pub use time::now_utc;
