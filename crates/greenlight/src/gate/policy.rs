use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::gate::{Decision, PendingAction};

/// Callback deciding the fate of a pending action request without a human.
///
/// `run_to_completion` consults the policy once per hop. Keep policies fast
/// and side-effect free.
pub type ApprovalPolicy = dyn Fn(&PendingAction) -> Decision + Send + Sync;

/// Policy that approves every pending request (the default auto-approve
/// behavior of the HTTP surface).
pub fn approve_all() -> Arc<ApprovalPolicy> {
    Arc::new(|_| Decision::Approve)
}

/// Policy that rejects every pending request.
pub fn reject_all() -> Arc<ApprovalPolicy> {
    Arc::new(|_| Decision::Reject)
}

/// Automatic decision a policy rule can produce. `Edit` is deliberately
/// absent: replacement arguments only make sense from an interactive caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDecision {
    Approve,
    Reject,
}

impl From<RuleDecision> for Decision {
    fn from(rule: RuleDecision) -> Self {
        match rule {
            RuleDecision::Approve => Decision::Approve,
            RuleDecision::Reject => Decision::Reject,
        }
    }
}

/// A single policy rule matching an action name and input pattern.
///
/// Rules are evaluated in order — first match wins. The `action` field is a
/// glob matched against the action name (`"*"` matches all actions). The
/// `pattern` field is a glob matched against all string values in the
/// proposed input (`"*"` matches everything).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub action: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    pub decision: RuleDecision,
}

fn default_pattern() -> String {
    "*".into()
}

impl PolicyRule {
    fn matches(&self, request: &PendingAction) -> bool {
        if self.action != "*" && !glob_match(&self.action, &request.action) {
            return false;
        }

        if self.pattern == "*" {
            return true;
        }

        match &request.input {
            serde_json::Value::Object(map) => map.values().any(|v| match v {
                serde_json::Value::String(s) => glob_match(&self.pattern, s),
                _ => false,
            }),
            _ => false,
        }
    }
}

/// Ordered set of policy rules with a fallback decision for unmatched
/// requests.
#[derive(Debug, Clone)]
pub struct PolicyRuleset {
    rules: Vec<PolicyRule>,
    fallback: RuleDecision,
}

impl PolicyRuleset {
    pub fn new(rules: Vec<PolicyRule>, fallback: RuleDecision) -> Self {
        Self { rules, fallback }
    }

    /// Decision of the first matching rule, or the fallback.
    pub fn evaluate(&self, request: &PendingAction) -> RuleDecision {
        self.rules
            .iter()
            .find(|r| r.matches(request))
            .map(|r| r.decision)
            .unwrap_or(self.fallback)
    }

    /// Convert the ruleset into an [`ApprovalPolicy`] callback.
    pub fn into_policy(self) -> Arc<ApprovalPolicy> {
        Arc::new(move |request| self.evaluate(request).into())
    }
}

impl Default for PolicyRuleset {
    fn default() -> Self {
        Self::new(Vec::new(), RuleDecision::Approve)
    }
}

/// Simple glob matching: `*` matches zero or more of any character,
/// `?` matches exactly one character. All other characters match literally.
///
/// Uses an iterative two-pointer approach (O(n*m) worst case) to avoid
/// exponential blowup from recursive backtracking on pathological patterns.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    // Position of the last '*' in pattern, and the text position to retry from.
    let (mut star_pi, mut star_ti) = (usize::MAX, 0usize);

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star_pi = pi;
            star_ti = ti;
            pi += 1;
        } else if star_pi != usize::MAX {
            // Backtrack: advance the star's text match by one
            pi = star_pi + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    // Consume trailing '*'s in pattern
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}
