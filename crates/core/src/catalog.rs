//! Scenario Catalog
//!
//! Read-only lookup tables for the industries, customer personas and voices a
//! trainee can pick from. Industry and persona names and persona traits are
//! embedded verbatim into backend prompts.

use serde::{Deserialize, Serialize};

/// A service industry the conversation takes place in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Industry {
    pub id: String,
    pub name: String,
    /// Icon identifier understood by the client.
    pub icon: String,
    pub description: String,
}

/// How hard a persona is to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    High,
    Medium,
    Low,
}

/// A customer archetype the backend role-plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Persona {
    pub id: String,
    pub name: String,
    /// Avatar image reference.
    pub avatar: String,
    pub difficulty: Difficulty,
    pub traits: Vec<String>,
    pub description: String,
}

/// A synthesized voice the client may use to speak customer lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VoiceOption {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Voice identifier on the speech backend.
    pub voice_name: String,
}

/// The immutable selection a session is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Scenario {
    pub industry: Industry,
    pub persona: Persona,
    pub voice: Option<VoiceOption>,
}

impl Scenario {
    pub fn new(industry: Industry, persona: Persona) -> Self {
        Self {
            industry,
            persona,
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: VoiceOption) -> Self {
        self.voice = Some(voice);
        self
    }
}

/// A lookup failure when resolving a scenario from catalog ids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Unknown industry: {0}")]
    UnknownIndustry(String),
    #[error("Unknown persona: {0}")]
    UnknownPersona(String),
    #[error("Unknown voice: {0}")]
    UnknownVoice(String),
}

/// The full set of selectable industries, personas and voices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Catalog {
    pub industries: Vec<Industry>,
    pub personas: Vec<Persona>,
    pub voices: Vec<VoiceOption>,
}

impl Catalog {
    /// The catalog shipped with the trainer.
    pub fn builtin() -> Self {
        let industries = [
            ("retail", "零售服务", "ShoppingCart", "处理退换货、物流延迟及会员积分纠纷。"),
            ("banking", "金融银行业", "Landmark", "涉及理财咨询、转账失败或账户异常提醒。"),
            ("telecom", "电信通讯", "Radio", "处理资费账单争议、网络覆盖及宽带报修。"),
            ("hospitality", "酒店旅游", "Hotel", "预订冲突、客房质量及加急服务响应。"),
            ("freight", "货物运输代理", "Truck", "处理国际物流延迟、报关异常及运费核算纠纷。"),
        ]
        .into_iter()
        .map(|(id, name, icon, description)| Industry {
            id: id.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            description: description.to_string(),
        })
        .collect();

        let personas = vec![
            Persona {
                id: "angry_elder".to_string(),
                name: "愤怒的高龄客户".to_string(),
                avatar: "https://picsum.photos/seed/p1/200/200".to_string(),
                difficulty: Difficulty::High,
                traits: vec!["传统保守".to_string(), "极度焦虑".to_string()],
                description: "性格固执、情绪化。对数字技术感到挫败，需要极大的耐心和同理心。"
                    .to_string(),
            },
            Persona {
                id: "busy_pro".to_string(),
                name: "精明的商务人士".to_string(),
                avatar: "https://picsum.photos/seed/p2/200/200".to_string(),
                difficulty: Difficulty::Medium,
                traits: vec!["效率优先".to_string(), "结果导向".to_string()],
                description: "逻辑清晰，极度关注时间成本和解决方案的有效性，反感场面话。"
                    .to_string(),
            },
            Persona {
                id: "tech_youth".to_string(),
                name: "科技达人青年".to_string(),
                avatar: "https://picsum.photos/seed/p3/200/200".to_string(),
                difficulty: Difficulty::Low,
                traits: vec!["快速反馈".to_string(), "网络敏感".to_string()],
                description: "善于使用社交媒体发声，对流程非常熟悉，希望获得个性化待遇。"
                    .to_string(),
            },
        ];

        let voices = [
            ("v1", "标准男声", "沉稳、专业", "Kore"),
            ("v2", "标准女声", "亲切、温和", "Puck"),
            ("v3", "活力女声", "热情、迅速", "Charon"),
            ("v4", "严肃男声", "正式、威严", "Fenrir"),
        ]
        .into_iter()
        .map(|(id, name, description, voice_name)| VoiceOption {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            voice_name: voice_name.to_string(),
        })
        .collect();

        Self {
            industries,
            personas,
            voices,
        }
    }

    pub fn industry(&self, id: &str) -> Option<&Industry> {
        self.industries.iter().find(|i| i.id == id)
    }

    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn voice(&self, id: &str) -> Option<&VoiceOption> {
        self.voices.iter().find(|v| v.id == id)
    }

    /// Resolves catalog ids into a [`Scenario`].
    pub fn scenario(
        &self,
        industry_id: &str,
        persona_id: &str,
        voice_id: Option<&str>,
    ) -> Result<Scenario, CatalogError> {
        let industry = self
            .industry(industry_id)
            .ok_or_else(|| CatalogError::UnknownIndustry(industry_id.to_string()))?;
        let persona = self
            .persona(persona_id)
            .ok_or_else(|| CatalogError::UnknownPersona(persona_id.to_string()))?;
        let mut scenario = Scenario::new(industry.clone(), persona.clone());
        if let Some(voice_id) = voice_id {
            let voice = self
                .voice(voice_id)
                .ok_or_else(|| CatalogError::UnknownVoice(voice_id.to_string()))?;
            scenario = scenario.with_voice(voice.clone());
        }
        Ok(scenario)
    }
}
