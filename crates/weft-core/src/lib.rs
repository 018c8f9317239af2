pub mod ids;
pub mod invalidate;

pub use ids::{CommunityId, ThreadId, UserId};
pub use invalidate::{BroadcastInvalidator, InvalidatedPath, NoopInvalidator, PathInvalidator};
