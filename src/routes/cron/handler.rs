use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::{
    AppState,
    clients::resend::{
        EmailMessage, ResendClient, trial_ended_email, trial_expiring_email,
        upgrade_reminder_email,
    },
    utils::error_body,
};

use super::model::{
    CronSummary, ExpiredTrialCandidate, TrialCandidate, UPGRADE_REMINDER_PERCENT,
    UpgradeCandidate, days_until, pick_trial_reminder, usage_percent,
};

fn display_name(full_name: Option<&str>, email: &str) -> String {
    full_name
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.to_string())
}

/// 生命周期邮件的定时派发。逐账号尽力而为:单个失败记入 errors,
/// 不中断其余账号;已发标记只在投递成功后落库,失败的下次运行自然重试。
#[axum::debug_handler]
pub async fn send_lifecycle_emails(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = state.config.cron_secret.as_deref() {
        let expected = format!("Bearer {}", secret);
        let provided = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        if provided != expected {
            return (StatusCode::UNAUTHORIZED, error_body("未授权访问")).into_response();
        }
    }

    let resend = ResendClient::new(
        state.http.clone(),
        state.config.resend_api_key.clone(),
        state.config.resend_from.clone(),
    );
    let now = Utc::now();
    let mut summary = CronSummary::default();

    // 1. 用量 ≥80% 的升级提醒
    match UpgradeCandidate::fetch(&state.pool).await {
        Ok(candidates) => {
            for candidate in candidates {
                let Some(email) = candidate.email.as_deref() else {
                    continue;
                };
                let percent = usage_percent(
                    candidate.monthly_usage.unwrap_or(0),
                    candidate.monthly_limit.unwrap_or(0),
                );
                if percent < UPGRADE_REMINDER_PERCENT {
                    continue;
                }

                let name = display_name(candidate.full_name.as_deref(), email);
                let (subject, text) = upgrade_reminder_email(&name, percent);
                match resend
                    .send(&EmailMessage {
                        to: email.to_string(),
                        subject,
                        text,
                    })
                    .await
                {
                    Ok(()) => match UpgradeCandidate::mark_sent(&state.pool, candidate.id).await {
                        Ok(()) => summary.upgrade_reminders += 1,
                        Err(e) => summary
                            .errors
                            .push(format!("Upgrade reminder flag failed for {}: {}", email, e)),
                    },
                    Err(e) => summary
                        .errors
                        .push(format!("Upgrade reminder failed for {}: {}", email, e)),
                }
            }
        }
        Err(e) => summary
            .errors
            .push(format!("Upgrade candidate query failed: {}", e)),
    }

    // 2. 试用到期前 7/3/1 天的提醒,每账号每次运行最多一封
    match TrialCandidate::fetch(&state.pool, now).await {
        Ok(candidates) => {
            for candidate in candidates {
                let (Some(email), Some(trial_ends_at)) =
                    (candidate.email.as_deref(), candidate.trial_ends_at)
                else {
                    continue;
                };
                let days_left = days_until(trial_ends_at, now);
                let sent_days = candidate.trial_reminder_days_sent.clone().unwrap_or_default();
                let Some(reminder_day) = pick_trial_reminder(days_left, &sent_days) else {
                    continue;
                };

                let name = display_name(candidate.full_name.as_deref(), email);
                let (subject, text) = trial_expiring_email(&name, days_left);
                match resend
                    .send(&EmailMessage {
                        to: email.to_string(),
                        subject,
                        text,
                    })
                    .await
                {
                    Ok(()) => {
                        match TrialCandidate::mark_day_sent(&state.pool, candidate.id, reminder_day)
                            .await
                        {
                            Ok(()) => summary.trial_expiring += 1,
                            Err(e) => summary
                                .errors
                                .push(format!("Trial reminder flag failed for {}: {}", email, e)),
                        }
                    }
                    Err(e) => summary
                        .errors
                        .push(format!("Trial expiring failed for {}: {}", email, e)),
                }
            }
        }
        Err(e) => summary
            .errors
            .push(format!("Trial candidate query failed: {}", e)),
    }

    // 3. 试用已结束的通知
    match ExpiredTrialCandidate::fetch(&state.pool, now).await {
        Ok(candidates) => {
            for candidate in candidates {
                let Some(email) = candidate.email.as_deref() else {
                    continue;
                };
                let name = display_name(candidate.full_name.as_deref(), email);
                let (subject, text) = trial_ended_email(&name);
                match resend
                    .send(&EmailMessage {
                        to: email.to_string(),
                        subject,
                        text,
                    })
                    .await
                {
                    Ok(()) => {
                        match ExpiredTrialCandidate::mark_sent(&state.pool, candidate.id).await {
                            Ok(()) => summary.trial_ended += 1,
                            Err(e) => summary
                                .errors
                                .push(format!("Trial ended flag failed for {}: {}", email, e)),
                        }
                    }
                    Err(e) => summary
                        .errors
                        .push(format!("Trial ended failed for {}: {}", email, e)),
                }
            }
        }
        Err(e) => summary
            .errors
            .push(format!("Expired trial query failed: {}", e)),
    }

    summary.success = true;
    summary.timestamp = Some(Utc::now());
    (StatusCode::OK, Json(summary)).into_response()
}
