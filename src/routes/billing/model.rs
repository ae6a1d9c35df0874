use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{config::Config, routes::detect::Plan};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// 缺省套餐按 pro 处理,与结账页默认选项一致
    #[serde(default = "default_plan")]
    pub plan: String,
}

fn default_plan() -> String {
    "pro".to_string()
}

#[derive(Debug, serde::Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// 正向映射:套餐 → 价格ID。未知或未配置的套餐返回 None,在结账入口报 400。
pub fn price_id_for_plan<'a>(config: &'a Config, plan: &str) -> Option<&'a str> {
    match plan {
        "pro" => config.stripe_pro_price_id.as_deref(),
        "university" => config.stripe_university_price_id.as_deref(),
        "enterprise" => config.stripe_enterprise_price_id.as_deref(),
        _ => None,
    }
}

/// 反向映射:价格ID → 套餐。未匹配的价格回退为 pro。
/// 与正向映射不对称,是沿用线上行为的显式决定(详见 DESIGN.md)。
pub fn plan_for_price_id(config: &Config, price_id: &str) -> Plan {
    if config.stripe_pro_price_id.as_deref() == Some(price_id) {
        Plan::Pro
    } else if config.stripe_university_price_id.as_deref() == Some(price_id) {
        Plan::University
    } else if config.stripe_enterprise_price_id.as_deref() == Some(price_id) {
        Plan::Enterprise
    } else {
        Plan::Pro
    }
}

/// 订阅状态迁移:active/trialing 保留解析出的套餐,其余一律降级免费档
pub fn plan_for_subscription(config: &Config, status: &str, price_id: &str) -> Plan {
    match status {
        "active" | "trialing" => plan_for_price_id(config, price_id),
        _ => Plan::Free,
    }
}

// webhook 事件只反序列化用到的字段

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutSessionObject {
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

impl CheckoutSessionObject {
    pub fn buyer_email(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or_else(|| self.customer_details.as_ref().and_then(|d| d.email.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItem {
    pub price: SubscriptionPrice,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionPrice {
    pub id: String,
}

impl SubscriptionObject {
    pub fn price_id(&self) -> &str {
        self.items
            .data
            .first()
            .map(|item| item.price.id.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, FromRow)]
pub struct CheckoutProfile {
    pub email: Option<String>,
    pub stripe_customer_id: Option<String>,
}

pub struct BillingProfile;

impl BillingProfile {
    pub async fn find_for_checkout(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<CheckoutProfile>, sqlx::Error> {
        sqlx::query_as::<_, CheckoutProfile>(
            "SELECT email, stripe_customer_id FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_customer_id(
        pool: &PgPool,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE profiles SET stripe_customer_id = $1 WHERE id = $2")
            .bind(customer_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 结账完成:写入套餐与订阅信息,带回 full_name 用于确认邮件
    pub async fn apply_checkout_completed(
        pool: &PgPool,
        user_id: Uuid,
        plan: &str,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "UPDATE profiles \
             SET plan = $1, stripe_customer_id = COALESCE($2, stripe_customer_id), \
                 stripe_subscription_id = $3 \
             WHERE id = $4 \
             RETURNING full_name",
        )
        .bind(plan)
        .bind(customer_id)
        .bind(subscription_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.and_then(|(full_name,)| full_name))
    }

    pub async fn find_by_subscription(
        pool: &PgPool,
        subscription_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM profiles WHERE stripe_subscription_id = $1 LIMIT 1")
                .bind(subscription_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn set_plan(pool: &PgPool, user_id: Uuid, plan: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE profiles SET plan = $1 WHERE id = $2")
            .bind(plan)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 订阅删除:降级免费档并清除存储的订阅ID(按订阅ID定位账号)
    pub async fn clear_subscription(
        pool: &PgPool,
        subscription_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE profiles SET plan = 'free', stripe_subscription_id = NULL \
             WHERE stripe_subscription_id = $1",
        )
        .bind(subscription_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_prices() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            jwt_secret: "secret".into(),
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            app_url: "http://localhost:3000".into(),
            pangram_api_key: None,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_pro_price_id: Some("price_pro".into()),
            stripe_university_price_id: Some("price_uni".into()),
            stripe_enterprise_price_id: Some("price_ent".into()),
            resend_api_key: None,
            resend_from: "test <test@example.com>".into(),
            cron_secret: None,
            demo_daily_limit: 3,
            demo_window_secs: 24 * 3600,
        }
    }

    #[test]
    fn paid_tiers_map_both_ways() {
        let config = config_with_prices();
        for (plan, price) in [
            (Plan::Pro, "price_pro"),
            (Plan::University, "price_uni"),
            (Plan::Enterprise, "price_ent"),
        ] {
            assert_eq!(price_id_for_plan(&config, plan.as_str()), Some(price));
            assert_eq!(plan_for_price_id(&config, price), plan);
        }
    }

    #[test]
    fn mapping_asymmetry_is_deliberate() {
        let config = config_with_prices();
        // 结账方向:未知套餐是硬错误
        assert_eq!(price_id_for_plan(&config, "platinum"), None);
        assert_eq!(price_id_for_plan(&config, "free"), None);
        // webhook 方向:未匹配价格回退为 pro
        assert_eq!(plan_for_price_id(&config, "price_unknown"), Plan::Pro);
    }

    #[test]
    fn unconfigured_price_id_is_a_checkout_error() {
        let mut config = config_with_prices();
        config.stripe_university_price_id = None;
        assert_eq!(price_id_for_plan(&config, "university"), None);
    }

    #[test]
    fn inactive_subscription_downgrades_to_free() {
        let config = config_with_prices();
        assert_eq!(plan_for_subscription(&config, "active", "price_ent"), Plan::Enterprise);
        assert_eq!(plan_for_subscription(&config, "trialing", "price_uni"), Plan::University);
        for status in ["canceled", "unpaid", "past_due", "incomplete"] {
            assert_eq!(plan_for_subscription(&config, status, "price_pro"), Plan::Free);
        }
    }

    #[test]
    fn subscription_object_reads_first_item_price() {
        let json = serde_json::json!({
            "id": "sub_123",
            "status": "active",
            "items": { "data": [ { "price": { "id": "price_pro" } } ] }
        });
        let sub: SubscriptionObject = serde_json::from_value(json).unwrap();
        assert_eq!(sub.price_id(), "price_pro");

        let empty: SubscriptionObject =
            serde_json::from_value(serde_json::json!({ "id": "sub_456" })).unwrap();
        assert_eq!(empty.price_id(), "");
    }

    #[test]
    fn buyer_email_falls_back_to_customer_details() {
        let session: CheckoutSessionObject = serde_json::from_value(serde_json::json!({
            "customer_details": { "email": "fallback@example.com" }
        }))
        .unwrap();
        assert_eq!(session.buyer_email(), Some("fallback@example.com"));
    }
}
