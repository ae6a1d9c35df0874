mod auth;
mod error_handler;
mod rate_limit;

pub use auth::auth_middleware;
pub use error_handler::log_errors;
pub use rate_limit::{DemoRateLimiter, QuotaExceeded, RateLimitEntry, client_identity};
