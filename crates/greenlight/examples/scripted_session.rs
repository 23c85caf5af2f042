//! Minimal approval-gate walkthrough using a scripted engine.
//!
//! No API key needed: the engine replays a fixed script that first proposes
//! a Yahoo Finance lookup, then answers with the result it was fed.
//!
//! ```bash
//! cargo run -p greenlight --example scripted_session
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use greenlight::{
    ApprovalGate, ChatMessage, ConversationEngine, EngineStep, Error, approve_all,
    research_actions,
};

struct ScriptedEngine {
    steps: Mutex<Vec<EngineStep>>,
}

impl ConversationEngine for ScriptedEngine {
    fn step<'a>(
        &'a self,
        history: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<EngineStep, Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut steps = self.steps.lock().expect("script lock poisoned");
            if steps.is_empty() {
                // Echo the most recent message (the action result) as the answer.
                let last = history.last().map(|m| m.content.clone()).unwrap_or_default();
                return Ok(EngineStep::FinalAnswer { text: last });
            }
            Ok(steps.remove(0))
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(ScriptedEngine {
        steps: Mutex::new(vec![EngineStep::ActionRequested {
            name: "yahoo_finance_revenue_growth".into(),
            input: serde_json::json!({"ticker": "TATAMOTORS.NS"}),
        }]),
    });

    let gate = ApprovalGate::builder(engine)
        .actions(research_actions())
        .build();

    let run = gate
        .run_to_completion(
            "demo-thread",
            ChatMessage::user("revenue growth for TATAMOTORS.NS"),
            &*approve_all(),
            3,
        )
        .await?;

    for stage in &run.stages {
        println!("[{}] {:?}", stage.stage, stage.outcome);
    }
    println!("\nfinal: {}", run.final_text);

    Ok(())
}
