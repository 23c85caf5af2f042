use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::engine::ConversationEngine;
use crate::engine::types::{ActionDefinition, ChatMessage, ChatRole, EngineStep};
use crate::error::Error;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Default system prompt for the stock-research scenario: when more than one
/// data source could answer, the model should ask which to use, then call
/// exactly one matching action.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a stock-research agent focused on revenue growth. \
     Available data sources: Yahoo Finance, Internal DB, Analyst PDF. \
     When more than one source could be used, ask the user which to run. \
     Then call exactly one tool that matches their choice.";

/// Conversation engine backed by the Anthropic Messages API.
///
/// Action definitions are advertised as tools; a `tool_use` block in the
/// response becomes `EngineStep::ActionRequested`, plain text becomes
/// `EngineStep::FinalAnswer`.
pub struct AnthropicEngine {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    actions: Vec<ActionDefinition>,
}

impl AnthropicEngine {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 1024,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Advertise the given actions to the model as callable tools.
    pub fn with_actions(mut self, actions: Vec<ActionDefinition>) -> Self {
        self.actions = actions;
        self
    }

    async fn complete(&self, history: &[ChatMessage]) -> Result<EngineStep, Error> {
        let body = build_request_body(
            &self.model,
            self.max_tokens,
            &self.system_prompt,
            history,
            &self.actions,
        );

        debug!(model = %self.model, messages = history.len(), "anthropic engine step");

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = response.json().await?;
        into_engine_step(api_response)
    }
}

impl ConversationEngine for AnthropicEngine {
    fn step<'a>(
        &'a self,
        history: &'a [ChatMessage],
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<EngineStep, Error>> + Send + 'a>,
    > {
        Box::pin(self.complete(history))
    }
}

fn build_request_body(
    model: &str,
    max_tokens: u32,
    system_prompt: &str,
    history: &[ChatMessage],
    actions: &[ActionDefinition],
) -> serde_json::Value {
    // The Messages API reserves `system` for the top-level prompt, so system
    // entries in the history (action results, rejection notices) are sent as
    // user turns.
    let messages: Vec<serde_json::Value> = history
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::Assistant => "assistant",
                ChatRole::User | ChatRole::System => "user",
            };
            serde_json::json!({"role": role, "content": m.content})
        })
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": messages,
    });

    if !system_prompt.is_empty() {
        body["system"] = serde_json::Value::String(system_prompt.to_string());
    }

    if !actions.is_empty() {
        body["tools"] = serde_json::to_value(actions).unwrap_or_default();
    }

    body
}

// --- API response mapping ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

fn into_engine_step(response: ApiResponse) -> Result<EngineStep, Error> {
    // A tool_use block wins over any accompanying text: the model has
    // committed to an action and the text is preamble.
    for block in &response.content {
        if let ApiContentBlock::ToolUse { name, input } = block {
            return Ok(EngineStep::ActionRequested {
                name: name.clone(),
                input: input.clone(),
            });
        }
    }

    let text: String = response
        .content
        .iter()
        .filter_map(|block| match block {
            ApiContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if text.is_empty() {
        return Err(Error::Engine("completion contained no usable content".into()));
    }

    Ok(EngineStep::FinalAnswer { text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticker_action() -> ActionDefinition {
        ActionDefinition {
            name: "yahoo_finance_revenue_growth".into(),
            description: "Fetch revenue growth from Yahoo Finance.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"ticker": {"type": "string"}},
                "required": ["ticker"]
            }),
        }
    }

    #[test]
    fn request_body_includes_model_and_messages() {
        let history = vec![ChatMessage::user("revenue growth for TATAMOTORS.NS")];
        let body = build_request_body("claude-sonnet-4-20250514", 1024, "sys", &history, &[]);
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(
            body["messages"][0]["content"],
            "revenue growth for TATAMOTORS.NS"
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn request_body_maps_system_history_to_user_turns() {
        let history = vec![
            ChatMessage::user("question"),
            ChatMessage::system("Result of yahoo_finance_revenue_growth: +11.5% YoY"),
            ChatMessage::assistant("answer"),
        ];
        let body = build_request_body("m", 512, "", &history, &[]);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][2]["role"], "assistant");
        // Empty system prompt is omitted entirely.
        assert!(body.get("system").is_none());
    }

    #[test]
    fn request_body_includes_tools_when_actions_present() {
        let history = vec![ChatMessage::user("q")];
        let body = build_request_body("m", 512, "sys", &history, &[ticker_action()]);
        assert_eq!(body["tools"][0]["name"], "yahoo_finance_revenue_growth");
        assert_eq!(
            body["tools"][0]["input_schema"]["required"][0],
            "ticker"
        );
    }

    #[test]
    fn response_with_text_becomes_final_answer() {
        let response: ApiResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "Revenue grew +11.5% YoY."}]
        }))
        .unwrap();
        let step = into_engine_step(response).unwrap();
        assert_eq!(
            step,
            EngineStep::FinalAnswer {
                text: "Revenue grew +11.5% YoY.".into()
            }
        );
    }

    #[test]
    fn response_with_tool_use_becomes_action_requested() {
        let response: ApiResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Let me check Yahoo Finance."},
                {"type": "tool_use", "id": "toolu_1", "name": "yahoo_finance_revenue_growth",
                 "input": {"ticker": "TATAMOTORS.NS"}}
            ]
        }))
        .unwrap();
        let step = into_engine_step(response).unwrap();
        assert_eq!(
            step,
            EngineStep::ActionRequested {
                name: "yahoo_finance_revenue_growth".into(),
                input: json!({"ticker": "TATAMOTORS.NS"}),
            }
        );
    }

    #[test]
    fn response_concatenates_text_blocks() {
        let response: ApiResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Part one. "},
                {"type": "text", "text": "Part two."}
            ]
        }))
        .unwrap();
        let step = into_engine_step(response).unwrap();
        assert_eq!(
            step,
            EngineStep::FinalAnswer {
                text: "Part one. Part two.".into()
            }
        );
    }

    #[test]
    fn empty_response_is_engine_error() {
        let response: ApiResponse = serde_json::from_value(json!({"content": []})).unwrap();
        let err = into_engine_step(response).unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }

    #[test]
    fn unknown_content_blocks_are_ignored() {
        let response: ApiResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "answer"}
            ]
        }))
        .unwrap();
        let step = into_engine_step(response).unwrap();
        assert_eq!(
            step,
            EngineStep::FinalAnswer {
                text: "answer".into()
            }
        );
    }

    #[test]
    fn builder_overrides_apply() {
        let engine = AnthropicEngine::new("key", "model")
            .with_max_tokens(2048)
            .with_system_prompt("custom")
            .with_actions(vec![ticker_action()]);
        assert_eq!(engine.max_tokens, 2048);
        assert_eq!(engine.system_prompt, "custom");
        assert_eq!(engine.actions.len(), 1);
    }

    #[test]
    fn default_system_prompt_mentions_all_sources() {
        let engine = AnthropicEngine::new("key", "model");
        assert!(engine.system_prompt.contains("Yahoo Finance"));
        assert!(engine.system_prompt.contains("Internal DB"));
        assert!(engine.system_prompt.contains("Analyst PDF"));
    }
}
