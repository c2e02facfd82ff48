//! Prompt Construction
//!
//! Every backend request is assembled from a small set of templates with
//! `{placeholder}` slots. The built-in templates can be overridden at startup
//! from a directory of markdown files named after the template key
//! (for example `customer_system.md`).

use crate::{
    catalog::Scenario,
    stage::Stage,
    turn::{ChatMessage, Speaker, Turn},
};
use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};
use tracing::{debug, info};

const CUSTOMER_SYSTEM: &str = "你现在扮演一名正在和客服沟通的客户。
背景行业：{industry}。
你的画像：{persona}，特点是{traits}。
当前所处的服务阶段：{stage}。
你的任务是：根据你的性格特点回复客服，你可以表现出不满、疑惑或满意，取决于客服的回复质量。
客服回复得好时你的情绪逐步缓和，回复得差时你会更加不满。
请保持回复简短（50字以内），符合口语化，只输出客户说的话。";

const OPENING: &str = "(系统提示：作为{persona}，你来到了{industry}服务台，由于某些原因你心情不好。请直接说出第一句挑衅或不满的话。)";

const COACH_SYSTEM: &str = "你是一名资深的MOT关键时刻服务导师。
请针对客服的回复给出专业建议。
如果是EXPLORE阶段，强调同理心和需求确认；
如果是OFFER阶段，强调方案的针对性；
如果是ACTION阶段，强调执行力和透明度；
如果是CONFIRM阶段，强调闭环和客户满意度。
你的回复应该包含：一段简短的评价，以及2-3个针对性的标签（如：同理心优先,立即补偿）。
返回格式: \"评价内容 | 标签1,标签2\"";

const COACH_REQUEST: &str = "行业：{industry}；客户画像：{persona}（{traits}）
客户刚才说: \"{customer_line}\"
客服回复说: \"{trainee_line}\"
当前阶段: {stage}（重点：{focus}）";

const EVALUATION_SYSTEM: &str = "你是一名MOT关键时刻服务评估专家。
请根据完整的对话记录，对客服的表现进行评分。
所有分数均为0到100之间的数字。
keyMoments 按对话顺序列出关键时刻，type 只能是 positive 或 negative，stage 使用 EXPLORE、OFFER、ACTION、CONFIRM 之一。
只输出符合以下 JSON Schema 的 JSON 对象，不要输出其他内容：
{schema}";

const EVALUATION_REQUEST: &str = "请对以下服务过程进行评估：
{transcript}";

/// Coaching emphasis for a stage.
pub fn stage_focus(stage: Stage) -> &'static str {
    match stage {
        Stage::Explore => "同理心和需求确认",
        Stage::Offer => "方案的针对性",
        Stage::Action => "执行力和透明度",
        Stage::Confirm => "闭环和客户满意度",
    }
}

/// The set of templates used to build backend requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub customer_system: String,
    pub opening: String,
    pub coach_system: String,
    pub coach_request: String,
    pub evaluation_system: String,
    pub evaluation_request: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            customer_system: CUSTOMER_SYSTEM.to_string(),
            opening: OPENING.to_string(),
            coach_system: COACH_SYSTEM.to_string(),
            coach_request: COACH_REQUEST.to_string(),
            evaluation_system: EVALUATION_SYSTEM.to_string(),
            evaluation_request: EVALUATION_REQUEST.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Overrides built-in templates with entries of `overrides` whose key
    /// matches a template name. Unknown keys are ignored.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        let slots: [(&str, &mut String); 6] = [
            ("customer_system", &mut self.customer_system),
            ("opening", &mut self.opening),
            ("coach_system", &mut self.coach_system),
            ("coach_request", &mut self.coach_request),
            ("evaluation_system", &mut self.evaluation_system),
            ("evaluation_request", &mut self.evaluation_request),
        ];
        for (key, slot) in slots {
            if let Some(template) = overrides.get(key) {
                debug!(template = key, "Overriding built-in prompt");
                *slot = template.trim().to_string();
            }
        }
        self
    }

    /// Loads overrides from every `*.md` file in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut overrides = HashMap::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read prompts directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
                let key = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .context("Could not get file stem")?
                    .to_string();
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read prompt {}", path.display()))?;
                overrides.insert(key, content);
            }
        }
        info!(count = overrides.len(), dir = %dir.display(), "Loaded prompt overrides");
        Ok(Self::default().with_overrides(&overrides))
    }

    /// System instruction for role-playing the customer.
    pub fn customer_system(&self, scenario: &Scenario, stage: Stage) -> String {
        fill(&self.customer_system, &scenario_vars(scenario, stage))
    }

    /// First user message asking the customer to open the conversation.
    pub fn opening(&self, scenario: &Scenario) -> String {
        fill(&self.opening, &scenario_vars(scenario, Stage::Explore))
    }

    pub fn coach_system(&self) -> String {
        self.coach_system.clone()
    }

    /// Single-shot coaching request about the latest exchange.
    pub fn coach_request(
        &self,
        scenario: &Scenario,
        stage: Stage,
        customer_line: &str,
        trainee_line: &str,
    ) -> String {
        let mut vars = scenario_vars(scenario, stage);
        vars.push(("customer_line", customer_line.to_string()));
        vars.push(("trainee_line", trainee_line.to_string()));
        vars.push(("focus", stage_focus(stage).to_string()));
        fill(&self.coach_request, &vars)
    }

    pub fn evaluation_system(&self, schema: &serde_json::Value) -> String {
        let schema = serde_json::to_string_pretty(schema).unwrap_or_default();
        fill(&self.evaluation_system, &[("schema", schema)])
    }

    pub fn evaluation_request(&self, turns: &[Turn]) -> String {
        fill(&self.evaluation_request, &[("transcript", transcript(turns))])
    }
}

/// Rebuilds the role-tagged history for a customer reply: the opening
/// instruction followed by every turn.
pub fn conversation_messages(opening: &str, turns: &[Turn]) -> Vec<ChatMessage> {
    std::iter::once(ChatMessage::user(opening))
        .chain(turns.iter().map(ChatMessage::from))
        .collect()
}

/// Renders turns as numbered lines for the evaluator.
pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let speaker = match turn.speaker {
                Speaker::Customer => "客户",
                Speaker::Trainee => "客服",
            };
            format!("[{}][{}] {}: {}", turn.sequence, turn.stage, speaker, turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn scenario_vars(scenario: &Scenario, stage: Stage) -> Vec<(&'static str, String)> {
    vec![
        ("industry", scenario.industry.name.clone()),
        ("persona", scenario.persona.name.clone()),
        ("traits", scenario.persona.traits.join("、")),
        ("stage", stage.to_string()),
    ]
}

fn fill(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
