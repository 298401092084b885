pub mod config;
pub mod handlers;
pub mod inline;
pub mod limiter;
pub mod mailer;
pub mod middleware;

pub use limiter::{RateLimitStatus, RateLimiter, RateLimiterBuilder};
pub use middleware::RateLimitGuard;
