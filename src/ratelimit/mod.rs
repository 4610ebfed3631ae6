//! Rate limiting logic and state management.

mod clock;
mod limiter;
mod record;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{Policy, RateLimiter};
pub use record::Record;
pub use sweeper::Sweeper;
