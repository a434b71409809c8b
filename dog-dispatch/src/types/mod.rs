pub mod ids;
pub mod tenant;
pub mod priority;
pub mod state;
pub mod events;

pub use ids::JobId;
pub use tenant::TenantKey;
pub use priority::JobPriority;
pub use state::{JobState, DropReason};
pub use events::DispatchEvent;
