pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod session;

pub use action::research::{fallback_revenue_growth, research_actions};
pub use action::{Action, ActionOutput, validate_action_input};
pub use config::GreenlightConfig;
pub use engine::ConversationEngine;
pub use engine::anthropic::AnthropicEngine;
pub use engine::types::{ActionDefinition, ChatMessage, ChatRole, EngineStep};
pub use error::Error;
pub use gate::policy::{
    ApprovalPolicy, PolicyRule, PolicyRuleset, RuleDecision, approve_all, reject_all,
};
pub use gate::{
    ApprovalGate, Decision, DecisionPayload, PendingAction, RunOutcome, StageResult, StepOutcome,
};
pub use session::{ConversationState, ConversationStore, InMemoryConversationStore};
