use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

/// 匿名试用限流:进程内计数,按客户端标识分桶。
/// 不做持久化,重启/重新部署后计数清零 —— 这是文档化的弱保证,不是缺陷。
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// 额度耗尽信号
#[derive(Debug, PartialEq, Eq)]
pub struct QuotaExceeded;

pub struct DemoRateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    limit: u32,
    window: chrono::Duration,
}

impl DemoRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limit,
            window: chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(24)),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// 检查额度,不产生任何状态变更。
    /// 返回当前窗口内已计入的次数;达到上限则返回 `QuotaExceeded`。
    pub fn check(&self, identity: &str) -> Result<u32, QuotaExceeded> {
        self.check_at(identity, Utc::now())
    }

    pub fn check_at(&self, identity: &str, now: DateTime<Utc>) -> Result<u32, QuotaExceeded> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // 条目缺失或窗口已过期都视为全新窗口
        let count = match entries.get(identity) {
            Some(entry) if now <= entry.reset_at => entry.count,
            _ => 0,
        };
        if count >= self.limit {
            return Err(QuotaExceeded);
        }
        Ok(count)
    }

    /// 仅在远端分类调用成功后调用;失败的调用不消耗额度。
    pub fn record_success(&self, identity: &str) {
        self.record_success_at(identity, Utc::now());
    }

    pub fn record_success_at(&self, identity: &str, now: DateTime<Utc>) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = entries
            .entry(identity.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_at: now + self.window,
            });
        if now > entry.reset_at {
            // 窗口从本窗口内首次请求起滑动,不对齐自然日
            *entry = RateLimitEntry {
                count: 0,
                reset_at: now + self.window,
            };
        }
        entry.count += 1;
    }
}

/// 从转发头推导客户端标识:取 x-forwarded-for 首项并去空白。
/// 没有转发头的客户端统一落入 "unknown" 共享桶(已知的策略边界)。
pub fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter() -> DemoRateLimiter {
        DemoRateLimiter::new(3, Duration::from_secs(24 * 3600))
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = limiter();
        let now = Utc::now();
        for expected in 0..3 {
            let count = limiter.check_at("1.2.3.4", now).unwrap();
            assert_eq!(count, expected);
            limiter.record_success_at("1.2.3.4", now);
        }
        // 同窗口内第 4 次被拒,且不改变状态
        assert_eq!(limiter.check_at("1.2.3.4", now), Err(QuotaExceeded));
        assert_eq!(limiter.check_at("1.2.3.4", now), Err(QuotaExceeded));
    }

    #[test]
    fn failed_calls_do_not_consume_quota() {
        let limiter = limiter();
        let now = Utc::now();
        for _ in 0..10 {
            // check 本身不累加,只有 record_success 计数
            assert_eq!(limiter.check_at("1.2.3.4", now).unwrap(), 0);
        }
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter = limiter();
        let start = Utc::now();
        for _ in 0..3 {
            limiter.record_success_at("1.2.3.4", start);
        }
        assert!(limiter.check_at("1.2.3.4", start).is_err());

        let later = start + chrono::Duration::hours(25);
        assert_eq!(limiter.check_at("1.2.3.4", later).unwrap(), 0);
        limiter.record_success_at("1.2.3.4", later);
        assert_eq!(limiter.check_at("1.2.3.4", later).unwrap(), 1);
    }

    #[test]
    fn identities_are_bucketed_independently() {
        let limiter = limiter();
        let now = Utc::now();
        for _ in 0..3 {
            limiter.record_success_at("1.2.3.4", now);
        }
        assert!(limiter.check_at("1.2.3.4", now).is_err());
        assert_eq!(limiter.check_at("5.6.7.8", now).unwrap(), 0);
    }

    #[test]
    fn identity_comes_from_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 10.0.0.1 , 192.168.1.1"),
        );
        assert_eq!(client_identity(&headers), "10.0.0.1");
    }

    #[test]
    fn missing_forwarded_header_collapses_to_unknown() {
        assert_eq!(client_identity(&HeaderMap::new()), "unknown");
    }
}
