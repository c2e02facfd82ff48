//! A deterministic [`TrainingBackend`] for development and integration
//! testing.
//!
//! Replies are picked from fixed per-stage lines, advice goes through the
//! same `comment | tags` parser as a real backend, and the report is derived
//! from simple transcript statistics.

use crate::{
    advice::CoachAdvice,
    catalog::Scenario,
    error::{AdapterError, EvaluationError},
    llm_client::TrainingBackend,
    prompt::stage_focus,
    report::{EvaluationReport, parse_evaluation},
    stage::Stage,
    turn::{ChatMessage, ChatRole, Speaker, Turn},
};
use async_trait::async_trait;
use serde_json::json;

pub struct ScriptedBackend;

impl ScriptedBackend {
    fn lines(stage: Stage) -> &'static [&'static str] {
        match stage {
            Stage::Explore => &[
                "你们这服务到底怎么回事？我已经等了很久了！",
                "别跟我说套话，我就想知道问题出在哪。",
                "你到底听明白我的意思没有？",
            ],
            Stage::Offer => &[
                "那你打算怎么给我解决？",
                "这个方案对我有什么用？说具体点。",
            ],
            Stage::Action => &[
                "好吧，那你现在就去办，什么时候能有结果？",
                "你可要说到做到，别又让我白等。",
            ],
            Stage::Confirm => &["行吧，这次算你们处理得还可以。", "好，那就先这样吧。"],
        }
    }
}

#[async_trait]
impl TrainingBackend for ScriptedBackend {
    async fn customer_reply(
        &self,
        _scenario: &Scenario,
        stage: Stage,
        history: &[ChatMessage],
    ) -> Result<String, AdapterError> {
        let spoken = history
            .iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .count();
        let lines = Self::lines(stage);
        Ok(lines[spoken % lines.len()].to_string())
    }

    async fn coach_advice(
        &self,
        _scenario: &Scenario,
        stage: Stage,
        _customer_line: &str,
        trainee_line: &str,
    ) -> Result<CoachAdvice, AdapterError> {
        let comment = if trainee_line.chars().count() < 8 {
            "回复过于简短，请多表达理解并说明下一步"
        } else {
            "回复态度良好，继续保持"
        };
        let raw = format!("{}，注意{} | {},沟通节奏", comment, stage_focus(stage), stage);
        Ok(CoachAdvice::from_reply(&raw))
    }

    async fn evaluation(&self, turns: &[Turn]) -> Result<EvaluationReport, EvaluationError> {
        let replies: Vec<&Turn> = turns
            .iter()
            .filter(|t| t.speaker == Speaker::Trainee)
            .collect();
        let average_len = if replies.is_empty() {
            0
        } else {
            replies.iter().map(|t| t.text.chars().count()).sum::<usize>() / replies.len()
        };
        let score = (50 + average_len.min(25) * 2).min(100);

        let key_moments: Vec<_> = replies
            .iter()
            .map(|t| {
                let kind = if t.text.chars().count() >= 8 {
                    "positive"
                } else {
                    "negative"
                };
                json!({
                    "type": kind,
                    "time": format!("第{}轮", t.sequence),
                    "stage": t.stage.to_string(),
                    "content": t.text,
                    "comment": "示例点评",
                })
            })
            .collect();

        let raw = json!({
            "overallScore": score,
            "empathy": score,
            "logic": score,
            "efficiency": score,
            "compliance": score,
            "professionalism": score,
            "summary": format!("共{}轮客服回复，平均长度{}字。", replies.len(), average_len),
            "strengths": [],
            "weaknesses": [],
            "keyMoments": key_moments,
        });
        parse_evaluation(&raw.to_string())
    }
}
