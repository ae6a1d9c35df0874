use serde::{Deserialize, Serialize};

use crate::clients::pangram::ClassifierResult;

/// 匿名试用转发给分类器前的最大文本长度(按字符截断)
pub const DEMO_MAX_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct DemoRequest {
    /// 缺失的 text 按空串处理,走统一的 400 校验路径
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct DemoResponse {
    /// 0-100 的整数分值
    pub score: i64,
    pub model: Option<String>,
    pub verdict: String,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    pub remaining: u32,
}

#[derive(Debug, Serialize)]
pub struct DemoLimitResponse {
    pub error: String,
    pub remaining: u32,
}

/// 把 v3 原始结果投影成试用接口的精简视图
pub fn project_demo_result(result: &ClassifierResult, remaining: u32) -> DemoResponse {
    let score = (result.fraction_ai.unwrap_or(0.0) * 100.0).round() as i64;
    let model = if result.prediction_short.as_deref() == Some("AI") {
        Some("生成式 AI".to_string())
    } else {
        None
    };
    let verdict = result.headline.clone().unwrap_or_else(|| {
        if score >= 50 {
            "检测到 AI 内容".to_string()
        } else {
            "人工撰写内容".to_string()
        }
    });

    DemoResponse {
        score,
        model,
        verdict,
        is_ai: score >= 50,
        remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_text_field_deserializes_to_empty() {
        let req: DemoRequest = serde_json::from_str("{}").unwrap();
        assert!(req.text.is_empty());
        // 空串走 400 校验路径,而不是反序列化报 422
        assert!(crate::utils::validate_text(&req.text).is_err());
    }

    #[test]
    fn score_is_rounded_from_fraction() {
        let result = ClassifierResult {
            fraction_ai: Some(0.876),
            ..Default::default()
        };
        let resp = project_demo_result(&result, 2);
        assert_eq!(resp.score, 88);
        assert!(resp.is_ai);
        assert_eq!(resp.remaining, 2);
    }

    #[test]
    fn missing_fraction_defaults_to_zero() {
        let resp = project_demo_result(&ClassifierResult::default(), 0);
        assert_eq!(resp.score, 0);
        assert!(!resp.is_ai);
    }

    #[test]
    fn model_label_only_for_ai_prediction() {
        let ai = ClassifierResult {
            prediction_short: Some("AI".into()),
            ..Default::default()
        };
        assert!(project_demo_result(&ai, 0).model.is_some());

        let human = ClassifierResult {
            prediction_short: Some("Human".into()),
            ..Default::default()
        };
        assert!(project_demo_result(&human, 0).model.is_none());
    }

    #[test]
    fn verdict_prefers_headline_then_threshold() {
        let with_headline = ClassifierResult {
            headline: Some("upstream headline".into()),
            fraction_ai: Some(0.9),
            ..Default::default()
        };
        assert_eq!(
            project_demo_result(&with_headline, 0).verdict,
            "upstream headline"
        );

        let above = ClassifierResult {
            fraction_ai: Some(0.5),
            ..Default::default()
        };
        assert_eq!(project_demo_result(&above, 0).verdict, "检测到 AI 内容");

        let below = ClassifierResult {
            fraction_ai: Some(0.49),
            ..Default::default()
        };
        assert_eq!(project_demo_result(&below, 0).verdict, "人工撰写内容");
    }
}
