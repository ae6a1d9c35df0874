use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    clients::pangram::{ClassifierError, PangramClient},
    middleware::client_identity,
    utils::{error_body, validate_text},
};

use super::model::{DEMO_MAX_CHARS, DemoLimitResponse, DemoRequest, project_demo_result};

#[axum::debug_handler]
pub async fn demo_detect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DemoRequest>,
) -> Response {
    let identity = client_identity(&headers);

    // 只检查不预留:额度在分类成功后才被消耗
    let count = match state.demo_limiter.check(&identity) {
        Ok(count) => count,
        Err(_) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(DemoLimitResponse {
                    error: "今日试用次数已用完,注册免费账号可继续使用".into(),
                    remaining: 0,
                }),
            )
                .into_response();
        }
    };

    let text = match validate_text(&req.text) {
        Ok(t) => t,
        Err(msg) => return (StatusCode::BAD_REQUEST, error_body(msg)).into_response(),
    };
    let truncated: String = text.chars().take(DEMO_MAX_CHARS).collect();

    let classifier = PangramClient::new(state.http.clone(), state.config.pangram_api_key.clone());
    match classifier.classify(&truncated).await {
        Ok(result) => {
            state.demo_limiter.record_success(&identity);
            let remaining = state.demo_limiter.limit() - count - 1;
            (StatusCode::OK, Json(project_demo_result(&result, remaining))).into_response()
        }
        Err(ClassifierError::Unconfigured) => {
            (StatusCode::SERVICE_UNAVAILABLE, error_body("服务暂不可用")).into_response()
        }
        Err(e) => {
            tracing::error!("Demo classifier call failed for {}: {}", identity, e);
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("分析失败")).into_response()
        }
    }
}
