use axum::{
    Json,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    clients::{
        resend::{EmailMessage, ResendClient, subscription_confirmed_email},
        stripe::{StripeClient, StripeError, verify_webhook_signature},
    },
    utils::{Claims, error_body},
};

use super::model::{
    BillingProfile, CheckoutRequest, CheckoutResponse, CheckoutSessionObject, SubscriptionObject,
    WebhookEvent, plan_for_subscription, price_id_for_plan,
};

#[axum::debug_handler]
pub async fn checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckoutRequest>,
) -> Response {
    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, error_body("未授权访问")).into_response();
        }
    };

    let Some(price_id) = price_id_for_plan(&state.config, &req.plan) else {
        return (StatusCode::BAD_REQUEST, error_body("无效或未配置的套餐")).into_response();
    };
    let price_id = price_id.to_string();

    let profile = match BillingProfile::find_for_checkout(&state.pool, user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, error_body("未授权访问")).into_response();
        }
        Err(e) => {
            tracing::error!("Failed to load profile for checkout {}: {}", user_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, error_body("数据库错误")).into_response();
        }
    };

    let stripe = StripeClient::new(state.http.clone(), state.config.stripe_secret_key.clone());

    // 首次结账先建立 Stripe 客户并落库
    let customer_id = match profile.stripe_customer_id {
        Some(id) => id,
        None => {
            let email = profile.email.as_deref().unwrap_or_default();
            match stripe.create_customer(email, &claims.sub).await {
                Ok(customer) => {
                    if let Err(e) =
                        BillingProfile::set_customer_id(&state.pool, user_id, &customer.id).await
                    {
                        tracing::error!("Failed to store customer id for {}: {}", user_id, e);
                        return (StatusCode::INTERNAL_SERVER_ERROR, error_body("数据库错误"))
                            .into_response();
                    }
                    customer.id
                }
                Err(StripeError::Unconfigured) => {
                    return (StatusCode::SERVICE_UNAVAILABLE, error_body("支付服务暂不可用"))
                        .into_response();
                }
                Err(e) => {
                    tracing::error!("Failed to create stripe customer for {}: {}", user_id, e);
                    return (StatusCode::INTERNAL_SERVER_ERROR, error_body("支付服务调用失败"))
                        .into_response();
                }
            }
        }
    };

    match stripe
        .create_checkout_session(
            &customer_id,
            &price_id,
            &req.plan,
            &claims.sub,
            &state.config.app_url,
        )
        .await
    {
        Ok(session) => match session.url {
            Some(url) => (StatusCode::OK, Json(CheckoutResponse { url })).into_response(),
            None => {
                tracing::error!("Checkout session {} has no url", session.id);
                (StatusCode::INTERNAL_SERVER_ERROR, error_body("支付服务调用失败"))
                    .into_response()
            }
        },
        Err(StripeError::Unconfigured) => {
            (StatusCode::SERVICE_UNAVAILABLE, error_body("支付服务暂不可用")).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to create checkout session for {}: {}", user_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("支付服务调用失败")).into_response()
        }
    }
}

#[axum::debug_handler]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(secret) = state.config.stripe_webhook_secret.as_deref() else {
        tracing::error!("STRIPE_WEBHOOK_SECRET is not configured, rejecting webhook");
        return (StatusCode::SERVICE_UNAVAILABLE, error_body("支付服务暂不可用")).into_response();
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    // 签名不通过:丢弃请求,不产生任何状态变更
    if !verify_webhook_signature(body.as_bytes(), signature, secret, Utc::now().timestamp()) {
        return (StatusCode::BAD_REQUEST, error_body("Invalid signature")).into_response();
    }

    let event: WebhookEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Malformed webhook payload: {}", e);
            return (StatusCode::BAD_REQUEST, error_body("Malformed payload")).into_response();
        }
    };

    let outcome = match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, event.data.object).await,
        "customer.subscription.updated" => {
            handle_subscription_updated(&state, event.data.object).await
        }
        "customer.subscription.deleted" => {
            handle_subscription_deleted(&state, event.data.object).await
        }
        other => {
            tracing::debug!("Ignoring webhook event type {}", other);
            Ok(())
        }
    };

    match outcome {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "received": true }))).into_response(),
        Err(e) => {
            tracing::error!("Webhook {} failed: {}", event.event_type, e);
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("内部服务器错误")).into_response()
        }
    }
}

async fn handle_checkout_completed(
    state: &AppState,
    object: serde_json::Value,
) -> Result<(), sqlx::Error> {
    let session: CheckoutSessionObject = match serde_json::from_value(object) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Unexpected checkout.session payload: {}", e);
            return Ok(());
        }
    };

    let Some(user_id) = session
        .metadata
        .user_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
    else {
        tracing::warn!("checkout.session.completed without user metadata");
        return Ok(());
    };
    let plan = session.metadata.plan.as_deref().unwrap_or("pro");

    let full_name = BillingProfile::apply_checkout_completed(
        &state.pool,
        user_id,
        plan,
        session.customer.as_deref(),
        session.subscription.as_deref(),
    )
    .await?;

    // 确认邮件尽力而为,失败只记日志,不影响webhook结果
    if let Some(email) = session.buyer_email() {
        let name = full_name.unwrap_or_else(|| {
            email.split('@').next().unwrap_or(email).to_string()
        });
        let (subject, text) = subscription_confirmed_email(&name, plan);
        let resend = ResendClient::new(
            state.http.clone(),
            state.config.resend_api_key.clone(),
            state.config.resend_from.clone(),
        );
        if let Err(e) = resend
            .send(&EmailMessage {
                to: email.to_string(),
                subject,
                text,
            })
            .await
        {
            tracing::warn!("Subscription confirmation email failed for {}: {}", user_id, e);
        }
    }

    Ok(())
}

async fn handle_subscription_updated(
    state: &AppState,
    object: serde_json::Value,
) -> Result<(), sqlx::Error> {
    let subscription: SubscriptionObject = match serde_json::from_value(object) {
        Ok(sub) => sub,
        Err(e) => {
            tracing::warn!("Unexpected subscription payload: {}", e);
            return Ok(());
        }
    };

    let Some(user_id) =
        BillingProfile::find_by_subscription(&state.pool, &subscription.id).await?
    else {
        tracing::debug!("No account for subscription {}", subscription.id);
        return Ok(());
    };

    let plan = plan_for_subscription(&state.config, &subscription.status, subscription.price_id());
    BillingProfile::set_plan(&state.pool, user_id, plan.as_str()).await
}

async fn handle_subscription_deleted(
    state: &AppState,
    object: serde_json::Value,
) -> Result<(), sqlx::Error> {
    let subscription: SubscriptionObject = match serde_json::from_value(object) {
        Ok(sub) => sub,
        Err(e) => {
            tracing::warn!("Unexpected subscription payload: {}", e);
            return Ok(());
        }
    };

    let affected = BillingProfile::clear_subscription(&state.pool, &subscription.id).await?;
    tracing::info!(
        "Subscription {} deleted, downgraded {} account(s) to free",
        subscription.id,
        affected
    );
    Ok(())
}
