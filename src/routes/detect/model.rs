use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::clients::pangram::{ClassifierResult, SentenceScore};

/// 订阅档位。额度策略固定在代码里,不走配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    Pro,
    University,
    Enterprise,
}

impl Plan {
    /// 未识别的套餐一律按免费档处理
    pub fn parse(s: &str) -> Self {
        match s {
            "pro" => Plan::Pro,
            "university" => Plan::University,
            "enterprise" => Plan::Enterprise,
            _ => Plan::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::University => "university",
            Plan::Enterprise => "enterprise",
        }
    }

    /// 每日检测次数上限。university 未单独配额,退回免费档上限。
    pub fn daily_limit(&self) -> i32 {
        match self {
            Plan::Pro => 100,
            Plan::Enterprise => 10000,
            Plan::Free | Plan::University => 5,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ProfileUsage {
    pub plan: Option<String>,
    pub scans_today: Option<i32>,
    pub scans_reset_at: Option<DateTime<Utc>>,
}

impl ProfileUsage {
    pub async fn find(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT plan, scans_today, scans_reset_at FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn reset_daily(
        pool: &PgPool,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE profiles SET scans_today = 0, scans_reset_at = $1 WHERE id = $2")
            .bind(now)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_scans_today(
        executor: impl PgExecutor<'_>,
        user_id: Uuid,
        scans_today: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE profiles SET scans_today = $1 WHERE id = $2")
            .bind(scans_today)
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(())
    }
}

/// 按服务器本地日历日判断是否需要跨天重置
pub fn needs_daily_reset(reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match reset_at {
        None => true,
        Some(t) => {
            t.with_timezone(&Local).date_naive() != now.with_timezone(&Local).date_naive()
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Authorization {
    /// 本次调用已获授权,携带检查时的计数与上限
    Granted { scans_today: i32, limit: i32 },
    /// 当日额度已耗尽
    Exhausted,
}

/// `authorize` 的纯决策核心:跨天重置落库与放行/拒绝相互独立,
/// 重置即使在请求随后被拒时也要持久化。
#[derive(Debug, PartialEq, Eq)]
pub struct UsageDecision {
    pub persist_reset: bool,
    pub authorization: Authorization,
}

pub fn evaluate_usage(plan: Plan, scans_today: i32, needs_reset: bool) -> UsageDecision {
    let effective = if needs_reset { 0 } else { scans_today };
    let limit = plan.daily_limit();
    let authorization = if effective >= limit {
        Authorization::Exhausted
    } else {
        Authorization::Granted {
            scans_today: effective,
            limit,
        }
    };
    UsageDecision {
        persist_reset: needs_reset,
        authorization,
    }
}

/// 额度检查。跨天时先落库重置(即使之后因额度拒绝);
/// 达到上限只拒绝,不做任何进一步变更。
pub async fn authorize(
    pool: &PgPool,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Authorization, sqlx::Error> {
    let profile = ProfileUsage::find(pool, user_id).await?;

    let plan = Plan::parse(
        profile
            .as_ref()
            .and_then(|p| p.plan.as_deref())
            .unwrap_or("free"),
    );
    let scans_today = profile.as_ref().and_then(|p| p.scans_today).unwrap_or(0);
    let reset_at = profile.as_ref().and_then(|p| p.scans_reset_at);

    let decision = evaluate_usage(plan, scans_today, needs_daily_reset(reset_at, now));
    if decision.persist_reset {
        ProfileUsage::reset_daily(pool, user_id, now).await?;
    }

    Ok(decision.authorization)
}

/// 仅在分类器成功返回后调用:计数 +1 并追加审计记录,
/// 两条语句同一事务提交,插入失败时计数一并回滚。
/// 分类器失败的请求不会走到这里,额度自然不被消耗。
pub async fn record_success(
    pool: &PgPool,
    user_id: Uuid,
    scans_today: i32,
    limit: i32,
    text: &str,
    result: &ClassifierResult,
) -> Result<i32, sqlx::Error> {
    let mut tx = pool.begin().await?;
    ProfileUsage::set_scans_today(&mut *tx, user_id, scans_today + 1).await?;
    ScanRecord::insert(&mut *tx, user_id, text, result).await?;
    tx.commit().await?;
    Ok(limit - scans_today - 1)
}

pub struct ScanRecord;

impl ScanRecord {
    pub async fn insert(
        executor: impl PgExecutor<'_>,
        user_id: Uuid,
        text: &str,
        result: &ClassifierResult,
    ) -> Result<(), sqlx::Error> {
        let snippet: String = text.chars().take(200).collect();
        let full_result = serde_json::to_value(result).unwrap_or(serde_json::Value::Null);

        sqlx::query(
            "INSERT INTO scans (id, user_id, text_snippet, ai_score, detected_model, full_result, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(snippet)
        .bind(result.ai_likelihood)
        .bind(result.detected_model.as_deref())
        .bind(full_result)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    /// 缺失的 text 按空串处理,走统一的 400 校验路径
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub ai_likelihood: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentences: Option<Vec<SentenceScore>>,
    pub scans_remaining: i32,
}

#[derive(Debug, Serialize)]
pub struct QuotaExceededResponse {
    pub error: String,
    pub scans_remaining: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn plan_ceilings_match_the_policy_table() {
        assert_eq!(Plan::parse("free").daily_limit(), 5);
        assert_eq!(Plan::parse("pro").daily_limit(), 100);
        assert_eq!(Plan::parse("enterprise").daily_limit(), 10000);
        // university 没有单独的日上限,落到免费档
        assert_eq!(Plan::parse("university").daily_limit(), 5);
        // 未知套餐同样落到免费档
        assert_eq!(Plan::parse("platinum").daily_limit(), 5);
    }

    #[test]
    fn missing_reset_date_forces_a_reset() {
        assert!(needs_daily_reset(None, Utc::now()));
    }

    #[test]
    fn same_day_does_not_reset() {
        let now = Utc::now();
        assert!(!needs_daily_reset(Some(now), now));
    }

    #[test]
    fn previous_day_forces_a_reset() {
        let now = Utc::now();
        assert!(needs_daily_reset(Some(now - Duration::days(1)), now));
    }

    #[test]
    fn remaining_quota_accounts_for_the_recorded_call() {
        // 重置后 scans_today=0,成功一次后剩余 4
        let limit = Plan::Free.daily_limit();
        let scans_today = 0;
        assert_eq!(limit - scans_today - 1, 4);
    }

    #[test]
    fn exhausted_account_is_rejected_without_reset() {
        let decision = evaluate_usage(Plan::Free, 5, false);
        assert!(!decision.persist_reset);
        assert_eq!(decision.authorization, Authorization::Exhausted);
    }

    #[test]
    fn stale_reset_date_grants_a_fresh_window() {
        // 昨日用满 5 次,跨天后重新放行且重置需落库
        let decision = evaluate_usage(Plan::Free, 5, true);
        assert!(decision.persist_reset);
        assert_eq!(
            decision.authorization,
            Authorization::Granted {
                scans_today: 0,
                limit: 5
            }
        );
    }

    #[test]
    fn reset_is_persisted_regardless_of_outcome() {
        for scans in [0, 5, 10000] {
            assert!(evaluate_usage(Plan::Free, scans, true).persist_reset);
        }
        assert!(!evaluate_usage(Plan::Free, 0, false).persist_reset);
    }

    #[test]
    fn missing_text_field_deserializes_to_empty() {
        let req: DetectRequest = serde_json::from_str("{}").unwrap();
        assert!(req.text.is_empty());
        // 空串走 400 校验路径,而不是反序列化报 422
        assert!(crate::utils::validate_text(&req.text).is_err());
    }
}
