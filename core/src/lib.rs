pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod rate_limit;

pub use cache::{QueryValue, ResponseCache, cache_key};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BridgeConfig;
pub use error::{ConfigError, RequestError, RequestResult};
pub use rate_limit::SlidingWindowRateLimiter;
