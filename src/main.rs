use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use novalearn_backend::{
    AppState,
    config::Config,
    middleware::{DemoRateLimiter, auth_middleware, log_errors},
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 未配置的供应商在启动时给出提示,对应路由会降级
    if config.pangram_api_key.is_none() {
        tracing::warn!("PANGRAM_API_KEY not configured, detection routes will return 503");
    }
    if config.stripe_secret_key.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not configured, checkout will return 503");
    }
    if config.stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not configured, webhooks will be rejected");
    }
    if config.resend_api_key.is_none() {
        tracing::warn!("RESEND_API_KEY not configured, emails will be skipped");
    }

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'novalearn_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 出站调用统一 30 秒超时,超时按上游不可用处理
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client");

    // 匿名试用限流器:进程内状态,按配置注入
    let demo_limiter = Arc::new(DemoRateLimiter::new(
        config.demo_daily_limit,
        config.demo_window(),
    ));

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        http,
        demo_limiter,
    };

    // 公开路由:匿名试用、计费回调、定时邮件(自带共享密钥校验)
    let public_routes = Router::new()
        .route("/demo-detect", post(routes::demo::demo_detect))
        .route("/webhooks/stripe", post(routes::billing::stripe_webhook))
        .route("/cron/emails", get(routes::cron::send_lifecycle_emails));

    // 需要认证的路由
    let protected_routes = Router::new()
        .route("/detect", post(routes::detect::detect))
        .route("/checkout", post(routes::billing::checkout))
        .route("/emails/welcome", post(routes::email::send_welcome))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件
    let router = router.layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service(),
    )
    .await
    .expect("Failed to start server");
}
