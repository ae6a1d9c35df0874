use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};

const PANGRAM_API_URL: &str = "https://text.api.pangramlabs.com/v3";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceScore {
    pub text: String,
    #[serde(default)]
    pub ai_likelihood: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_model: Option<String>,
}

/// v3 接口的原始返回。认证检测取 ai_likelihood/detected_model/sentences,
/// 匿名试用直接投影 fraction_ai/prediction_short/headline。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierResult {
    #[serde(default)]
    pub ai_likelihood: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentences: Option<Vec<SentenceScore>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction_ai: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}

#[derive(Debug)]
pub enum ClassifierError {
    /// 未配置 PANGRAM_API_KEY
    Unconfigured,
    /// 上游返回非 2xx
    Upstream(String),
    Transport(reqwest::Error),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierError::Unconfigured => write!(f, "classifier API key is not configured"),
            ClassifierError::Upstream(detail) => write!(f, "classifier API error: {}", detail),
            ClassifierError::Transport(e) => write!(f, "classifier request failed: {}", e),
        }
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        ClassifierError::Transport(e)
    }
}

pub struct PangramClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

impl PangramClient {
    pub fn new(http: Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: PANGRAM_API_URL.to_string(),
        }
    }

    pub async fn classify(&self, text: &str) -> Result<ClassifierResult, ClassifierError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ClassifierError::Unconfigured)?;

        let resp = self
            .http
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Upstream(format!("{} - {}", status, body)));
        }

        Ok(resp.json().await?)
    }
}
