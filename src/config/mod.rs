use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub app_url: String,
    pub pangram_api_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_pro_price_id: Option<String>,
    pub stripe_university_price_id: Option<String>,
    pub stripe_enterprise_price_id: Option<String>,
    pub resend_api_key: Option<String>,
    pub resend_from: String,
    pub cron_secret: Option<String>,
    pub demo_daily_limit: u32,
    pub demo_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "::".into()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_default()
                .parse()
                .unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "https://novalearn.co.uk".into()),
            // 各家供应商密钥允许缺省,对应路由降级返回 503,不阻塞启动
            pangram_api_key: env::var("PANGRAM_API_KEY").ok(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            stripe_pro_price_id: env::var("STRIPE_PRO_PRICE_ID").ok(),
            stripe_university_price_id: env::var("STRIPE_UNIVERSITY_PRICE_ID").ok(),
            stripe_enterprise_price_id: env::var("STRIPE_ENTERPRISE_PRICE_ID").ok(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            resend_from: env::var("RESEND_FROM")
                .unwrap_or_else(|_| "NovaLearn <no-reply@novalearn.co.uk>".into()),
            cron_secret: env::var("CRON_SECRET").ok(),
            demo_daily_limit: env::var("DEMO_DAILY_LIMIT")
                .unwrap_or_default()
                .parse()
                .unwrap_or(3),
            demo_window_secs: env::var("DEMO_WINDOW_SECS")
                .unwrap_or_default()
                .parse()
                .unwrap_or(24 * 3600),
        })
    }

    pub fn demo_window(&self) -> Duration {
        Duration::from_secs(self.demo_window_secs)
    }
}
