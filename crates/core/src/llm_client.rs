//! LLM Adapter
//!
//! Translates trainer requests into chat-completion calls. The rest of the
//! crate only sees the [`TrainingBackend`] trait; the vendor is picked once at
//! startup and never changes for the life of the process.

use crate::{
    advice::CoachAdvice,
    catalog::Scenario,
    error::{AdapterError, ConfigurationError, EvaluationError},
    prompt::PromptTemplates,
    report::{EvaluationReport, parse_evaluation},
    stage::Stage,
    turn::{ChatMessage, ChatRole, Turn},
};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{debug, instrument};

/// The three operations the orchestrator needs from a language model.
///
/// Implementations are stateless between calls: every call carries its own
/// full context.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    /// Produces the next in-character customer line.
    ///
    /// `history` starts with the opening instruction and then alternates
    /// customer (assistant) and trainee (user) messages.
    async fn customer_reply(
        &self,
        scenario: &Scenario,
        stage: Stage,
        history: &[ChatMessage],
    ) -> Result<String, AdapterError>;

    /// Produces coaching feedback on the latest exchange.
    ///
    /// A reply that does not follow the advice format degrades to
    /// [`CoachAdvice::fallback`] instead of failing.
    async fn coach_advice(
        &self,
        scenario: &Scenario,
        stage: Stage,
        customer_line: &str,
        trainee_line: &str,
    ) -> Result<CoachAdvice, AdapterError>;

    /// Scores the whole conversation.
    async fn evaluation(&self, turns: &[Turn]) -> Result<EvaluationReport, EvaluationError>;
}

/// Supported chat-completion vendors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
    DeepSeek,
    /// Offline deterministic backend, see [`crate::scripted::ScriptedBackend`].
    Scripted,
}

impl Provider {
    pub fn default_api_base(self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::DeepSeek => "https://api.deepseek.com/v1",
            Provider::Scripted => "",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o",
            Provider::Gemini => "gemini-2.5-flash",
            Provider::DeepSeek => "deepseek-chat",
            Provider::Scripted => "scripted",
        }
    }

    /// How the vendor accepts structured output requests.
    pub fn structured_output(self) -> StructuredOutput {
        match self {
            Provider::DeepSeek => StructuredOutput::JsonObject,
            _ => StructuredOutput::JsonSchema,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => write!(f, "openai"),
            Provider::Gemini => write!(f, "gemini"),
            Provider::DeepSeek => write!(f, "deepseek"),
            Provider::Scripted => write!(f, "scripted"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "gemini" => Ok(Provider::Gemini),
            "deepseek" => Ok(Provider::DeepSeek),
            "scripted" | "mock" => Ok(Provider::Scripted),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Structured-output mode used for the evaluation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructuredOutput {
    /// `response_format: json_schema` with the report schema attached.
    JsonSchema,
    /// `response_format: json_object`; the schema travels in the prompt only.
    JsonObject,
}

/// Connection settings for an OpenAI-compatible backend.
#[derive(Clone, Debug)]
pub struct BackendSettings {
    pub provider: Provider,
    pub api_key: SecretString,
    pub api_base: String,
    pub model: String,
    pub reply_temperature: f32,
    pub advice_temperature: f32,
}

impl BackendSettings {
    /// Settings with the vendor's default endpoint and model.
    pub fn new(provider: Provider, api_key: SecretString) -> Self {
        Self {
            provider,
            api_key,
            api_base: provider.default_api_base().to_string(),
            model: provider.default_model().to_string(),
            reply_temperature: 0.8,
            advice_temperature: 0.7,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// A [`TrainingBackend`] for any OpenAI-compatible chat-completion API.
pub struct OpenAICompatibleBackend {
    client: Client<OpenAIConfig>,
    settings: BackendSettings,
    prompts: Arc<PromptTemplates>,
}

impl OpenAICompatibleBackend {
    /// Creates the backend, failing before any network I/O when the
    /// credential is absent.
    pub fn new(
        settings: BackendSettings,
        prompts: Arc<PromptTemplates>,
    ) -> Result<Self, ConfigurationError> {
        if settings.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigurationError::MissingCredential(
                settings.provider.to_string(),
            ));
        }
        if settings.model.trim().is_empty() {
            return Err(ConfigurationError::InvalidSetting(
                "model".to_string(),
                "must not be empty".to_string(),
            ));
        }
        let config = OpenAIConfig::new()
            .with_api_key(settings.api_key.expose_secret())
            .with_api_base(settings.api_base.clone());
        Ok(Self {
            client: Client::with_config(config),
            settings,
            prompts,
        })
    }

    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        temperature: Option<f32>,
        response_format: Option<ResponseFormat>,
    ) -> Result<String, AdapterError> {
        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.settings.model).messages(messages);
        if let Some(temperature) = temperature {
            request.temperature(temperature);
        }
        if let Some(format) = response_format {
            request.response_format(format);
        }
        let request = request.build().map_err(backend_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(backend_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(AdapterError::EmptyResponse);
        }
        debug!(chars = content.chars().count(), "Backend completion received");
        Ok(content)
    }

    fn evaluation_format(&self, schema: serde_json::Value) -> ResponseFormat {
        match self.settings.provider.structured_output() {
            StructuredOutput::JsonSchema => ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: Some("MOT service evaluation report".to_string()),
                    name: "evaluation_report".to_string(),
                    schema: Some(schema),
                    strict: Some(false),
                },
            },
            StructuredOutput::JsonObject => ResponseFormat::JsonObject,
        }
    }
}

#[async_trait]
impl TrainingBackend for OpenAICompatibleBackend {
    #[instrument(skip_all, fields(provider = %self.settings.provider, %stage, history = history.len()))]
    async fn customer_reply(
        &self,
        scenario: &Scenario,
        stage: Stage,
        history: &[ChatMessage],
    ) -> Result<String, AdapterError> {
        let system = ChatMessage::system(self.prompts.customer_system(scenario, stage));
        let messages = std::iter::once(&system)
            .chain(history.iter())
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;
        self.complete(messages, Some(self.settings.reply_temperature), None)
            .await
    }

    #[instrument(skip_all, fields(provider = %self.settings.provider, %stage))]
    async fn coach_advice(
        &self,
        scenario: &Scenario,
        stage: Stage,
        customer_line: &str,
        trainee_line: &str,
    ) -> Result<CoachAdvice, AdapterError> {
        let messages = [
            ChatMessage::system(self.prompts.coach_system()),
            ChatMessage::user(self.prompts.coach_request(
                scenario,
                stage,
                customer_line,
                trainee_line,
            )),
        ]
        .iter()
        .map(to_request_message)
        .collect::<Result<Vec<_>, _>>()?;

        let raw = self
            .complete(messages, Some(self.settings.advice_temperature), None)
            .await?;
        Ok(CoachAdvice::from_reply(&raw))
    }

    #[instrument(skip_all, fields(provider = %self.settings.provider, turns = turns.len()))]
    async fn evaluation(&self, turns: &[Turn]) -> Result<EvaluationReport, EvaluationError> {
        let schema = EvaluationReport::json_schema();
        let messages = [
            ChatMessage::system(self.prompts.evaluation_system(&schema)),
            ChatMessage::user(self.prompts.evaluation_request(turns)),
        ]
        .iter()
        .map(to_request_message)
        .collect::<Result<Vec<_>, _>>()?;

        let raw = self
            .complete(messages, None, Some(self.evaluation_format(schema)))
            .await?;
        parse_evaluation(&raw)
    }
}

fn backend_error(err: OpenAIError) -> AdapterError {
    AdapterError::Backend(err.to_string())
}

/// Converts a backend-neutral message into the async-openai request type.
fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, AdapterError> {
    let content = message.content.clone();
    let built: Result<ChatCompletionRequestMessage, OpenAIError> = match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map(Into::into),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map(Into::into),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()
            .map(Into::into),
    };
    built.map_err(backend_error)
}
