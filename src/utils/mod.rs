use axum::Json;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// 提交文本的最小有效长度(去除首尾空白后按字符计)
pub const MIN_TEXT_CHARS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 账号ID
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// 两条检测路径共用的入参校验:非空,去空白后至少 50 个字符。
/// 校验失败必须发生在任何网络或存储调用之前。
pub fn validate_text(text: &str) -> Result<&str, &'static str> {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TEXT_CHARS {
        return Err("文本至少需要 50 个字符");
    }
    Ok(trimmed)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_body(msg: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody { error: msg.into() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    // 令牌由外部认证方签发,服务端只做校验;签发逻辑仅测试需要
    fn issue_token(user_id: &str, config: &Config) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + Duration::hours(24)).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap()
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            jwt_secret: "test-secret".into(),
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            app_url: "http://localhost:3000".into(),
            pangram_api_key: None,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_pro_price_id: None,
            stripe_university_price_id: None,
            stripe_enterprise_price_id: None,
            resend_api_key: None,
            resend_from: "test <test@example.com>".into(),
            cron_secret: None,
            demo_daily_limit: 3,
            demo_window_secs: 24 * 3600,
        }
    }

    #[test]
    fn token_roundtrip_preserves_subject() {
        let config = test_config();
        let token = issue_token("user-42", &config);
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let config = test_config();
        let token = issue_token("user-42", &config);
        let mut other = test_config();
        other.jwt_secret = "another-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn short_text_is_rejected() {
        assert!(validate_text("too short").is_err());
        // 空白不计入长度
        let padded = format!("   {}   ", "x".repeat(49));
        assert!(validate_text(&padded).is_err());
    }

    #[test]
    fn valid_text_is_trimmed() {
        let text = format!("  {}  ", "y".repeat(50));
        assert_eq!(validate_text(&text).unwrap(), "y".repeat(50));
    }
}
