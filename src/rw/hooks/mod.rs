//! Built-in hooks.

mod checksum;
mod count;
mod hash;
mod limit;
mod speed;
mod stop;

pub use checksum::ChecksumHook;
pub use count::CountHook;
pub use hash::{HashAlgorithm, HashHook, Hasher};
pub use limit::{RateLimitHook, RateLimiter};
pub use speed::SpeedHook;
pub use stop::StopHook;
