use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    AppState,
    clients::resend::{EmailMessage, ResendClient, welcome_email},
    utils::{Claims, error_body},
};

use super::model::{WelcomeProfile, WelcomeResponse};

/// 注册完成后由前端触发的欢迎邮件。旁路调用:投递在后台任务里完成,
/// 失败只记日志,绝不影响主流程的响应。
#[axum::debug_handler]
pub async fn send_welcome(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, error_body("未授权访问")).into_response();
        }
    };

    let profile = match WelcomeProfile::find(&state.pool, user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, error_body("账号不存在")).into_response();
        }
        Err(e) => {
            tracing::error!("Failed to load profile for welcome email {}: {}", user_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, error_body("数据库错误")).into_response();
        }
    };

    // 幂等:已发过就不再排队
    if profile.welcome_email_sent.unwrap_or(false) {
        return (StatusCode::OK, Json(WelcomeResponse { queued: false })).into_response();
    }

    let Some(email) = profile.email else {
        return (StatusCode::NOT_FOUND, error_body("账号未绑定邮箱")).into_response();
    };

    let name = profile
        .full_name
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());
    let (subject, text) = welcome_email(&name);

    let pool = state.pool.clone();
    let resend = ResendClient::new(
        state.http.clone(),
        state.config.resend_api_key.clone(),
        state.config.resend_from.clone(),
    );
    tokio::spawn(async move {
        match resend
            .send(&EmailMessage {
                to: email.clone(),
                subject,
                text,
            })
            .await
        {
            Ok(()) => {
                if let Err(e) = WelcomeProfile::mark_sent(&pool, user_id).await {
                    tracing::warn!("Failed to flag welcome email for {}: {}", user_id, e);
                }
            }
            Err(e) => {
                tracing::warn!("Welcome email failed for {}: {}", email, e);
            }
        }
    });

    (StatusCode::ACCEPTED, Json(WelcomeResponse { queued: true })).into_response()
}
