use std::fmt;

use reqwest::Client;
use serde::Serialize;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug)]
pub enum EmailError {
    /// 未配置 RESEND_API_KEY
    Unconfigured,
    Api(String),
    Transport(reqwest::Error),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::Unconfigured => write!(f, "email service is not configured"),
            EmailError::Api(detail) => write!(f, "email API error: {}", detail),
            EmailError::Transport(e) => write!(f, "email request failed: {}", e),
        }
    }
}

impl From<reqwest::Error> for EmailError {
    fn from(e: reqwest::Error) -> Self {
        EmailError::Transport(e)
    }
}

pub struct ResendClient {
    http: Client,
    api_key: Option<String>,
    from: String,
}

impl ResendClient {
    pub fn new(http: Client, api_key: Option<String>, from: String) -> Self {
        Self {
            http,
            api_key,
            from,
        }
    }

    pub async fn send(&self, msg: &EmailMessage) -> Result<(), EmailError> {
        let api_key = self.api_key.as_deref().ok_or(EmailError::Unconfigured)?;

        let resp = self
            .http
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": msg.to,
                "subject": msg.subject,
                "text": msg.text,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmailError::Api(format!("{} - {}", status, body)));
        }

        Ok(())
    }
}

// 邮件正文统一纯文本,HTML 模板由营销侧维护,不在本服务范围内

fn first_name(name: &str) -> &str {
    name.split(' ').next().filter(|s| !s.is_empty()).unwrap_or("there")
}

pub fn welcome_email(name: &str) -> (String, String) {
    let first = first_name(name);
    (
        format!("欢迎加入 NovaLearn,{}!", first),
        format!(
            "{},感谢注册 NovaLearn。\n\n\
             你的免费试用包含每月 50 次分析、AI 模型识别和 7 天历史记录。\n\
             立即开始第一次分析:https://novalearn.co.uk/dashboard\n",
            first
        ),
    )
}

pub fn upgrade_reminder_email(name: &str, usage_percent: i64) -> (String, String) {
    let first = first_name(name);
    (
        "你的月度分析额度即将用完".to_string(),
        format!(
            "{},你本月已使用 {}% 的分析额度。\n\
             升级套餐可获得更多分析次数:https://novalearn.co.uk/dashboard/upgrade\n",
            first, usage_percent
        ),
    )
}

pub fn trial_expiring_email(name: &str, days_left: i32) -> (String, String) {
    let first = first_name(name);
    (
        format!("试用期还剩 {} 天", days_left),
        format!(
            "{},你的 NovaLearn 试用期还有 {} 天结束。\n\
             升级以保留完整功能:https://novalearn.co.uk/dashboard/upgrade\n",
            first, days_left
        ),
    )
}

pub fn trial_ended_email(name: &str) -> (String, String) {
    let first = first_name(name);
    (
        "你的试用期已结束".to_string(),
        format!(
            "{},你的 NovaLearn 试用期已经结束,账号已切换到免费档。\n\
             随时可以升级恢复完整额度:https://novalearn.co.uk/dashboard/upgrade\n",
            first
        ),
    )
}

pub fn subscription_confirmed_email(name: &str, plan: &str) -> (String, String) {
    let first = first_name(name);
    (
        "订阅已生效".to_string(),
        format!(
            "{},你的 {} 套餐订阅已生效,额度已即时更新。\n\
             前往控制台:https://novalearn.co.uk/dashboard\n",
            first, plan
        ),
    )
}
