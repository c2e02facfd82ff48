//! Core logic of the MOT service-recovery trainer.
//!
//! A trainee picks a [`catalog::Scenario`] and talks to a simulated customer
//! voiced by a [`llm_client::TrainingBackend`]. The [`session`] module drives
//! the conversation through the four [`stage::Stage`]s, collects coaching
//! advice after every reply and finally requests an
//! [`report::EvaluationReport`]. The core never touches HTTP or storage.

pub mod advice;
pub mod catalog;
pub mod error;
pub mod llm_client;
pub mod prompt;
pub mod registry;
pub mod report;
pub mod scripted;
pub mod session;
pub mod stage;
pub mod turn;

pub use advice::CoachAdvice;
pub use catalog::{Catalog, Scenario};
pub use error::{AdapterError, ConfigurationError, EvaluationError, SessionError};
pub use llm_client::{BackendSettings, OpenAICompatibleBackend, Provider, TrainingBackend};
pub use prompt::PromptTemplates;
pub use registry::SessionRegistry;
pub use report::EvaluationReport;
pub use scripted::ScriptedBackend;
pub use session::{Orchestrator, SessionSnapshot, SessionStatus, TrainingSession, TurnOutcome};
pub use stage::{Stage, StagePolicy};
pub use turn::{Speaker, Turn};
