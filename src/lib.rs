use config::Config;
use sqlx::PgPool;
use std::sync::Arc;

pub mod clients;
pub mod config;
pub mod middleware;
pub mod utils;

pub mod routes;

use middleware::DemoRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub http: reqwest::Client,
    pub demo_limiter: Arc<DemoRateLimiter>,
}
