pub mod error;
pub mod identity;
pub mod ids;
pub mod records;
pub mod time;

pub use error::CoreError;
pub use identity::Identity;
pub use ids::*;
pub use records::*;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
