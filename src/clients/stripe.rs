use std::fmt;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";

/// webhook 签名时间戳允许的最大偏差
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct Customer {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug)]
pub enum StripeError {
    /// 未配置 STRIPE_SECRET_KEY
    Unconfigured,
    Api(String),
    Transport(reqwest::Error),
}

impl fmt::Display for StripeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripeError::Unconfigured => write!(f, "stripe secret key is not configured"),
            StripeError::Api(detail) => write!(f, "stripe API error: {}", detail),
            StripeError::Transport(e) => write!(f, "stripe request failed: {}", e),
        }
    }
}

impl From<reqwest::Error> for StripeError {
    fn from(e: reqwest::Error) -> Self {
        StripeError::Transport(e)
    }
}

pub struct StripeClient {
    http: Client,
    secret_key: Option<String>,
}

impl StripeClient {
    pub fn new(http: Client, secret_key: Option<String>) -> Self {
        Self { http, secret_key }
    }

    pub async fn create_customer(
        &self,
        email: &str,
        user_id: &str,
    ) -> Result<Customer, StripeError> {
        let key = self.secret_key.as_deref().ok_or(StripeError::Unconfigured)?;

        let params = [("email", email), ("metadata[user_id]", user_id)];
        let resp = self
            .http
            .post(format!("{}/customers", STRIPE_API_URL))
            .bearer_auth(key)
            .form(&params)
            .send()
            .await?;

        Self::parse_response(resp).await
    }

    /// 创建托管结账会话(订阅模式)
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        plan: &str,
        user_id: &str,
        app_url: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let key = self.secret_key.as_deref().ok_or(StripeError::Unconfigured)?;

        let success_url = format!("{}/dashboard?success=true", app_url);
        let cancel_url = format!("{}/dashboard?canceled=true", app_url);
        let params = [
            ("customer", customer_id),
            ("mode", "subscription"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
            ("metadata[user_id]", user_id),
            ("metadata[plan]", plan),
            ("allow_promotion_codes", "true"),
        ];

        let resp = self
            .http
            .post(format!("{}/checkout/sessions", STRIPE_API_URL))
            .bearer_auth(key)
            .form(&params)
            .send()
            .await?;

        Self::parse_response(resp).await
    }

    async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StripeError> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StripeError::Api(format!("{} - {}", status, body)));
        }
        Ok(resp.json().await?)
    }
}

/// 校验 Stripe-Signature 头:`t=<unix>,v1=<hex>[,v1=...]`。
/// 签名对象为 "{t}.{payload}" 的 HMAC-SHA256,时间戳超出容差即拒绝。
/// 校验失败的请求必须被丢弃,不产生任何状态变更。
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_unix - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    let Ok(mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    let mut mac = mac;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|sig| mac.clone().verify_slice(&sig).is_ok())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, ts: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(ts.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = format!("t=1700000000,v1={}", sign(payload, "whsec_test", 1_700_000_000));
        assert!(verify_webhook_signature(
            payload,
            &header,
            "whsec_test",
            1_700_000_000
        ));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = format!("t=1700000000,v1={}", sign(payload, "whsec_test", 1_700_000_000));
        assert!(!verify_webhook_signature(
            br#"{"type":"customer.subscription.deleted"}"#,
            &header,
            "whsec_test",
            1_700_000_000
        ));
    }

    #[test]
    fn rejects_a_wrong_secret() {
        let payload = b"payload";
        let header = format!("t=1700000000,v1={}", sign(payload, "whsec_other", 1_700_000_000));
        assert!(!verify_webhook_signature(
            payload,
            &header,
            "whsec_test",
            1_700_000_000
        ));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let payload = b"payload";
        let header = format!("t=1700000000,v1={}", sign(payload, "whsec_test", 1_700_000_000));
        assert!(!verify_webhook_signature(
            payload,
            &header,
            "whsec_test",
            1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1
        ));
    }

    #[test]
    fn rejects_a_malformed_header() {
        assert!(!verify_webhook_signature(
            b"payload",
            "v1=deadbeef",
            "whsec_test",
            1_700_000_000
        ));
        assert!(!verify_webhook_signature(
            b"payload",
            "t=notanumber,v1=deadbeef",
            "whsec_test",
            1_700_000_000
        ));
    }
}
