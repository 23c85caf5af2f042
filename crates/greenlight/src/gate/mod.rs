pub mod policy;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::action::{Action, validate_action_input};
use crate::engine::ConversationEngine;
use crate::engine::types::{ActionDefinition, ChatMessage, EngineStep};
use crate::error::Error;
use crate::session::{ConversationState, ConversationStore, InMemoryConversationStore};

pub use self::policy::ApprovalPolicy;

/// Prefix for human-readable pending-action descriptions.
const DESCRIPTION_PREFIX: &str = "Action execution pending approval";

/// A suspended, not-yet-executed action proposal awaiting a decision.
/// Consumed exactly once by the resume that resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub action: String,
    pub input: serde_json::Value,
    pub description: String,
}

/// Decision resolving exactly one pending action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Decision {
    /// Execute the pending action with its original arguments.
    Approve,
    /// Execute the pending action with replacement arguments.
    Edit { input: serde_json::Value },
    /// Skip execution; the engine is told the action was rejected.
    Reject,
}

/// Wire payload carrying decisions from an external actor.
///
/// The gate holds at most one pending request per conversation, so only a
/// single decision is ever applicable per resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub decisions: Vec<Decision>,
}

impl DecisionPayload {
    pub fn approve() -> Self {
        Self {
            decisions: vec![Decision::Approve],
        }
    }

    fn into_decision(self) -> Result<Decision, Error> {
        let count = self.decisions.len();
        let mut decisions = self.decisions;
        match count {
            1 => Ok(decisions.remove(0)),
            0 => Err(Error::InvalidDecision("payload contains no decisions".into())),
            n => Err(Error::InvalidDecision(format!(
                "payload contains {n} decisions, expected exactly 1"
            ))),
        }
    }
}

/// Result of one gate operation on a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The engine produced a final answer; the conversation turn is over.
    Completed { reply: String },
    /// The engine proposed an action. Nothing has executed; the conversation
    /// is suspended until a decision arrives.
    Suspended { request: PendingAction },
}

impl StepOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, StepOutcome::Suspended { .. })
    }
}

/// One recorded stage of `run_to_completion`: `"initial"`, then
/// `"resume_1"`, `"resume_2"`, … in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    #[serde(rename = "result")]
    pub outcome: StepOutcome,
}

/// Aggregate of a `run_to_completion` call.
///
/// `pending` distinguishes "the engine answered" from "the hop limit ran out
/// while still suspended"; `final_text` is the last available message text
/// either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub final_text: String,
    pub stages: Vec<StageResult>,
    pub pending: bool,
}

/// The approval gate: no registered action executes without an explicit
/// decision, and conversations stay resumable across process boundaries.
///
/// Construct once at startup via [`ApprovalGate::builder`] and share behind
/// an `Arc`; all per-conversation state lives in the store.
pub struct ApprovalGate {
    engine: Arc<dyn ConversationEngine>,
    store: Arc<dyn ConversationStore>,
    actions: HashMap<String, Arc<dyn Action>>,
    action_defs: Vec<ActionDefinition>,
}

impl ApprovalGate {
    pub fn builder(engine: Arc<dyn ConversationEngine>) -> ApprovalGateBuilder {
        ApprovalGateBuilder {
            engine,
            store: None,
            actions: Vec::new(),
        }
    }

    /// Names of all registered actions, in registration order.
    pub fn action_names(&self) -> Vec<String> {
        self.action_defs.iter().map(|d| d.name.clone()).collect()
    }

    pub fn definitions(&self) -> &[ActionDefinition] {
        &self.action_defs
    }

    /// Append a message to the conversation (creating it if absent) and
    /// drive the engine one step.
    ///
    /// If the engine proposes an action, the operation suspends *before*
    /// running it and returns the pending request; no side effect has
    /// occurred. Fails with `PendingDecision` if a pending request is
    /// already outstanding.
    pub async fn submit(
        &self,
        thread_id: &str,
        message: ChatMessage,
    ) -> Result<StepOutcome, Error> {
        let (mut state, expected) = match self.store.load(thread_id)? {
            Some((state, version)) => {
                if state.pending.is_some() {
                    return Err(Error::PendingDecision(thread_id.to_string()));
                }
                (state, Some(version))
            }
            None => (ConversationState::default(), None),
        };

        debug!(thread = %thread_id, messages = state.messages.len(), "submit");
        state.messages.push(message);
        self.step_engine_and_commit(thread_id, state, expected).await
    }

    /// Resolve the outstanding pending request of a suspended conversation.
    ///
    /// The suspension point is cleared (and committed) before any side
    /// effect runs: a concurrent duplicate resume on the stale snapshot
    /// loses the store's compare-and-set and fails with `NoPendingRequest`
    /// instead of re-executing the action. Exactly one pending request is
    /// consumed per successful call; a resume that fails after the consume
    /// commit leaves the request consumed, not re-offered.
    pub async fn resume(&self, thread_id: &str, decision: Decision) -> Result<StepOutcome, Error> {
        let (mut state, version) = self
            .store
            .load(thread_id)?
            .ok_or_else(|| Error::NoPendingRequest(thread_id.to_string()))?;
        let pending = state
            .pending
            .take()
            .ok_or_else(|| Error::NoPendingRequest(thread_id.to_string()))?;

        // Reject caller mistakes while the request is still intact and the
        // conversation still resumable.
        if let Decision::Edit { input } = &decision {
            let def = self.definition_of(&pending.action)?;
            validate_action_input(&def.input_schema, input)
                .map_err(|e| Error::InvalidDecision(format!("edited input rejected: {e}")))?;
        }

        debug!(thread = %thread_id, action = %pending.action, request = %pending.id, "resume");

        // Consume commit: clear the suspension point before executing.
        let version = match self.store.store(thread_id, state.clone(), Some(version)) {
            Ok(v) => v,
            Err(Error::Conflict(_)) => {
                return Err(Error::NoPendingRequest(thread_id.to_string()));
            }
            Err(e) => return Err(e),
        };

        let note = match decision {
            Decision::Approve => {
                let result = self.run_action(&pending, pending.input.clone()).await?;
                format!("Result of {}: {result}", pending.action)
            }
            Decision::Edit { input } => {
                let result = self.run_action(&pending, input).await?;
                format!("Result of {}: {result}", pending.action)
            }
            Decision::Reject => format!(
                "Action '{}' was rejected by the operator. Do not execute it; \
                 answer with what you have or propose an alternative.",
                pending.action
            ),
        };

        state.messages.push(ChatMessage::system(note));
        self.step_engine_and_commit(thread_id, state, Some(version))
            .await
    }

    /// Resolve a pending request from a wire decision payload. The payload
    /// must carry exactly one decision.
    pub async fn resume_with_payload(
        &self,
        thread_id: &str,
        payload: DecisionPayload,
    ) -> Result<StepOutcome, Error> {
        self.resume(thread_id, payload.into_decision()?).await
    }

    /// Submit, then resume under `policy` until the engine answers or
    /// `max_hops` resumes have happened.
    ///
    /// When the hop limit is exhausted while still suspended, the outcome
    /// carries `pending: true` and the conversation stays suspended for a
    /// future explicit resume — runaway engines are bounded without
    /// silently approving forever.
    pub async fn run_to_completion(
        &self,
        thread_id: &str,
        message: ChatMessage,
        policy: &ApprovalPolicy,
        max_hops: usize,
    ) -> Result<RunOutcome, Error> {
        let mut current = self.submit(thread_id, message).await?;
        let mut stages = vec![StageResult {
            stage: "initial".into(),
            outcome: current.clone(),
        }];

        let mut hops = 0;
        while let StepOutcome::Suspended { request } = &current {
            if hops >= max_hops {
                debug!(thread = %thread_id, max_hops, "hop limit reached while suspended");
                break;
            }
            let decision = policy(request);
            hops += 1;
            current = self.resume(thread_id, decision).await?;
            stages.push(StageResult {
                stage: format!("resume_{hops}"),
                outcome: current.clone(),
            });
        }

        let pending = current.is_suspended();
        let final_text = match &current {
            StepOutcome::Completed { reply } => reply.clone(),
            StepOutcome::Suspended { .. } => self.last_text(thread_id)?,
        };

        Ok(RunOutcome {
            final_text,
            stages,
            pending,
        })
    }

    fn definition_of(&self, name: &str) -> Result<&ActionDefinition, Error> {
        self.action_defs
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::Action(format!("unknown action: {name}")))
    }

    async fn run_action(
        &self,
        pending: &PendingAction,
        input: serde_json::Value,
    ) -> Result<String, Error> {
        let action = self
            .actions
            .get(&pending.action)
            .ok_or_else(|| Error::Action(format!("unknown action: {}", pending.action)))?;
        let output = action.execute(input).await?;
        if output.is_error {
            return Err(Error::Action(output.content));
        }
        Ok(output.content)
    }

    /// Step the engine over the given state and commit the result. Nothing
    /// is persisted if the engine fails or proposes a malformed request.
    async fn step_engine_and_commit(
        &self,
        thread_id: &str,
        mut state: ConversationState,
        expected: Option<u64>,
    ) -> Result<StepOutcome, Error> {
        let step = self.engine.step(&state.messages).await?;

        let outcome = match step {
            EngineStep::FinalAnswer { text } => {
                state.messages.push(ChatMessage::assistant(&text));
                StepOutcome::Completed { reply: text }
            }
            EngineStep::ActionRequested { name, input } => {
                let def = self.definition_of(&name).map_err(|_| {
                    Error::Engine(format!("engine requested unknown action: {name}"))
                })?;
                validate_action_input(&def.input_schema, &input).map_err(|e| {
                    Error::Engine(format!("engine proposed invalid input for {name}: {e}"))
                })?;
                let request = PendingAction {
                    id: Uuid::new_v4(),
                    action: name.clone(),
                    input,
                    description: format!("{DESCRIPTION_PREFIX}: {name}"),
                };
                debug!(thread = %thread_id, action = %name, request = %request.id, "suspending");
                state.pending = Some(request.clone());
                StepOutcome::Suspended { request }
            }
        };

        self.store.store(thread_id, state, expected)?;
        Ok(outcome)
    }

    fn last_text(&self, thread_id: &str) -> Result<String, Error> {
        Ok(self
            .store
            .load(thread_id)?
            .and_then(|(state, _)| state.last_text().map(str::to_string))
            .unwrap_or_default())
    }
}

pub struct ApprovalGateBuilder {
    engine: Arc<dyn ConversationEngine>,
    store: Option<Arc<dyn ConversationStore>>,
    actions: Vec<Arc<dyn Action>>,
}

impl ApprovalGateBuilder {
    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: Vec<Arc<dyn Action>>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn build(self) -> ApprovalGate {
        let action_defs: Vec<ActionDefinition> =
            self.actions.iter().map(|a| a.definition()).collect();
        let actions: HashMap<String, Arc<dyn Action>> = self
            .actions
            .into_iter()
            .map(|a| (a.definition().name, a))
            .collect();

        ApprovalGate {
            engine: self.engine,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryConversationStore::new())),
            actions,
            action_defs,
        }
    }
}
