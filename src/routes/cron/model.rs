use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// 升级提醒的触发阈值(月度用量百分比)
pub const UPGRADE_REMINDER_PERCENT: i64 = 80;

/// 试用到期提醒的天数档位,按先大后小的顺序尝试,每次运行最多发一封
pub const TRIAL_REMINDER_DAYS: [i32; 3] = [7, 3, 1];

pub fn usage_percent(monthly_usage: i32, monthly_limit: i32) -> i64 {
    if monthly_limit <= 0 {
        return 0;
    }
    ((monthly_usage as f64 / monthly_limit as f64) * 100.0).round() as i64
}

/// 距试用结束的天数,向上取整
pub fn days_until(trial_ends_at: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let secs = (trial_ends_at - now).num_seconds();
    (secs as f64 / 86400.0).ceil() as i32
}

/// 选出本次应发送的到期提醒档位:剩余天数落进档位且该档位尚未发过
pub fn pick_trial_reminder(days_left: i32, sent_days: &[i32]) -> Option<i32> {
    TRIAL_REMINDER_DAYS
        .iter()
        .copied()
        .find(|day| days_left <= *day && !sent_days.contains(day))
}

#[derive(Debug, FromRow)]
pub struct UpgradeCandidate {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub monthly_usage: Option<i32>,
    pub monthly_limit: Option<i32>,
}

impl UpgradeCandidate {
    /// 免费账号中尚未收到升级提醒的
    pub async fn fetch(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, email, full_name, monthly_usage, monthly_limit FROM profiles \
             WHERE subscription_status IS NULL AND upgrade_reminder_sent = false",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn mark_sent(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE profiles SET upgrade_reminder_sent = true WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
pub struct TrialCandidate {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub trial_reminder_days_sent: Option<Vec<i32>>,
}

impl TrialCandidate {
    /// 试用仍在进行中的免费账号
    pub async fn fetch(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, email, full_name, trial_ends_at, trial_reminder_days_sent FROM profiles \
             WHERE subscription_status IS NULL AND trial_ends_at IS NOT NULL AND trial_ends_at > $1",
        )
        .bind(now)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_day_sent(pool: &PgPool, user_id: Uuid, day: i32) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE profiles SET trial_reminder_days_sent = \
             array_append(COALESCE(trial_reminder_days_sent, '{}'), $1) WHERE id = $2",
        )
        .bind(day)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
pub struct ExpiredTrialCandidate {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl ExpiredTrialCandidate {
    /// 试用已结束且还没发过结束通知的免费账号
    pub async fn fetch(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, email, full_name FROM profiles \
             WHERE subscription_status IS NULL AND trial_ends_at < $1 \
               AND trial_ended_email_sent = false",
        )
        .bind(now)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_sent(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE profiles SET trial_ended_email_sent = true WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize)]
pub struct CronSummary {
    pub success: bool,
    pub upgrade_reminders: u32,
    pub trial_expiring: u32,
    pub trial_ended: u32,
    pub errors: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn usage_percent_rounds_and_guards_zero_limit() {
        assert_eq!(usage_percent(42, 50), 84);
        assert_eq!(usage_percent(1, 3), 33);
        assert_eq!(usage_percent(10, 0), 0);
    }

    #[test]
    fn reminder_picks_largest_applicable_unsent_day() {
        // 剩余 6 天:7 天档适用
        assert_eq!(pick_trial_reminder(6, &[]), Some(7));
        // 7 天档已发,6 天不落进 3 天档
        assert_eq!(pick_trial_reminder(6, &[7]), None);
        // 剩余 2 天:跳过已发的 7 天档,命中 3 天档
        assert_eq!(pick_trial_reminder(2, &[7]), Some(3));
        // 全部发过则不再发
        assert_eq!(pick_trial_reminder(1, &[7, 3, 1]), None);
    }

    #[test]
    fn reminder_sends_at_most_one_per_run() {
        // 一次挑一个档位,发过之后同一状态不会再次命中
        let mut sent = vec![];
        let picked = pick_trial_reminder(1, &sent).unwrap();
        assert_eq!(picked, 7);
        sent.push(picked);
        assert_eq!(pick_trial_reminder(1, &sent), Some(3));
    }

    #[test]
    fn days_until_rounds_up_partial_days() {
        let now = Utc::now();
        assert_eq!(days_until(now + Duration::hours(25), now), 2);
        assert_eq!(days_until(now + Duration::hours(24), now), 1);
        assert_eq!(days_until(now + Duration::minutes(30), now), 1);
    }
}
