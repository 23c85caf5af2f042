use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::gate::policy::{PolicyRule, PolicyRuleset, RuleDecision};

/// Top-level configuration loaded from `greenlight.toml`.
///
/// Every section is optional; an empty file yields working defaults.
#[derive(Debug, Default, Deserialize)]
pub struct GreenlightConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl GreenlightConfig {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }
}

/// Conversation engine (model provider) configuration.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Model identifier passed to the Messages API.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Override for the built-in stock-research system prompt.
    pub system_prompt: Option<String>,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

/// Approval gate settings.
#[derive(Debug, Deserialize)]
pub struct GateConfig {
    /// Maximum auto-resume hops per inbound request.
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    /// Whether inbound requests auto-approve by default.
    #[serde(default = "default_auto_approve")]
    pub auto_approve: bool,
    /// Thread id used when the caller does not supply one.
    #[serde(default = "default_thread")]
    pub default_thread: String,
}

fn default_max_hops() -> usize {
    3
}

fn default_auto_approve() -> bool {
    true
}

fn default_thread() -> String {
    "api-thread".into()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            auto_approve: default_auto_approve(),
            default_thread: default_thread(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8088".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Auto-approval policy rules. Evaluated in order — first match wins; the
/// fallback applies when nothing matches. With no rules and the default
/// fallback, every pending request is approved (the original behavior).
#[derive(Debug, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default = "default_fallback")]
    pub fallback: RuleDecision,
}

fn default_fallback() -> RuleDecision {
    RuleDecision::Approve
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            fallback: default_fallback(),
        }
    }
}

impl PolicyConfig {
    pub fn into_ruleset(self) -> PolicyRuleset {
        PolicyRuleset::new(self.rules, self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Decision;
    use crate::gate::policy::RuleDecision;
    use std::io::Write;

    #[test]
    fn empty_config_yields_defaults() {
        let config = GreenlightConfig::from_str("").unwrap();
        assert_eq!(config.engine.model, "claude-sonnet-4-20250514");
        assert_eq!(config.engine.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.engine.max_tokens, 1024);
        assert!(config.engine.system_prompt.is_none());
        assert_eq!(config.gate.max_hops, 3);
        assert!(config.gate.auto_approve);
        assert_eq!(config.gate.default_thread, "api-thread");
        assert_eq!(config.server.bind, "127.0.0.1:8088");
        assert!(config.policy.rules.is_empty());
        assert_eq!(config.policy.fallback, RuleDecision::Approve);
    }

    #[test]
    fn full_config_parses() {
        let toml_str = r#"
[engine]
model = "claude-haiku-4-20250514"
api_key_env = "MY_KEY"
max_tokens = 2048
system_prompt = "Answer tersely."

[gate]
max_hops = 5
auto_approve = false
default_thread = "cli-thread"

[server]
bind = "0.0.0.0:9000"

[policy]
fallback = "reject"

[[policy.rules]]
action = "*_revenue_growth"
decision = "approve"
"#;
        let config = GreenlightConfig::from_str(toml_str).unwrap();
        assert_eq!(config.engine.model, "claude-haiku-4-20250514");
        assert_eq!(config.engine.api_key_env, "MY_KEY");
        assert_eq!(config.engine.max_tokens, 2048);
        assert_eq!(config.engine.system_prompt.as_deref(), Some("Answer tersely."));
        assert_eq!(config.gate.max_hops, 5);
        assert!(!config.gate.auto_approve);
        assert_eq!(config.gate.default_thread, "cli-thread");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.policy.rules.len(), 1);
        assert_eq!(config.policy.fallback, RuleDecision::Reject);
    }

    #[test]
    fn policy_config_becomes_working_ruleset() {
        let toml_str = r#"
[policy]
fallback = "reject"

[[policy.rules]]
action = "*_revenue_growth"
decision = "approve"
"#;
        let config = GreenlightConfig::from_str(toml_str).unwrap();
        let policy = config.policy.into_ruleset().into_policy();

        let approved = crate::gate::PendingAction {
            id: uuid::Uuid::new_v4(),
            action: "yahoo_finance_revenue_growth".into(),
            input: serde_json::json!({}),
            description: String::new(),
        };
        assert_eq!(policy(&approved), Decision::Approve);

        let rejected = crate::gate::PendingAction {
            action: "wire_transfer".into(),
            ..approved
        };
        assert_eq!(policy(&rejected), Decision::Reject);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greenlight.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"[gate]\nmax_hops = 7\n").unwrap();

        let config = GreenlightConfig::from_file(&path).unwrap();
        assert_eq!(config.gate.max_hops, 7);
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let err = GreenlightConfig::from_file(Path::new("/nonexistent/greenlight.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = GreenlightConfig::from_str("this is not valid toml {{{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("invalid config"));
    }
}
