use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    clients::pangram::{ClassifierError, PangramClient},
    utils::{Claims, error_body, validate_text},
};

use super::model::{self, Authorization, DetectRequest, DetectResponse, QuotaExceededResponse};

#[axum::debug_handler]
pub async fn detect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DetectRequest>,
) -> Response {
    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, error_body("未授权访问")).into_response();
        }
    };

    // 输入校验先行:无效输入不触达数据库和分类器
    let text = match validate_text(&req.text) {
        Ok(t) => t.to_string(),
        Err(msg) => return (StatusCode::BAD_REQUEST, error_body(msg)).into_response(),
    };

    let authorization = match model::authorize(&state.pool, user_id, Utc::now()).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Failed to load usage for {}: {}", user_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, error_body("数据库错误")).into_response();
        }
    };

    let (scans_today, limit) = match authorization {
        Authorization::Exhausted => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(QuotaExceededResponse {
                    error: "每日额度已用完,升级套餐可获得更多分析次数".into(),
                    scans_remaining: 0,
                }),
            )
                .into_response();
        }
        Authorization::Granted { scans_today, limit } => (scans_today, limit),
    };

    let classifier = PangramClient::new(state.http.clone(), state.config.pangram_api_key.clone());
    let result = match classifier.classify(&text).await {
        Ok(r) => r,
        Err(ClassifierError::Unconfigured) => {
            return (StatusCode::SERVICE_UNAVAILABLE, error_body("检测服务暂不可用"))
                .into_response();
        }
        Err(e) => {
            // 分类失败:不计数也不写审计记录,额度保持不变
            tracing::error!("Classifier call failed for {}: {}", user_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, error_body("分析失败")).into_response();
        }
    };

    match model::record_success(&state.pool, user_id, scans_today, limit, &text, &result).await {
        Ok(remaining) => (
            StatusCode::OK,
            Json(DetectResponse {
                ai_likelihood: result.ai_likelihood,
                detected_model: result.detected_model.clone(),
                sentences: result.sentences.clone(),
                scans_remaining: remaining,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to record scan for {}: {}", user_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("保存分析结果失败")).into_response()
        }
    }
}
