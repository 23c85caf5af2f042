pub mod anthropic;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use crate::engine::types::{ChatMessage, EngineStep};
use crate::error::Error;

/// The opaque reasoning component deciding what to say or do next.
///
/// Given the conversation so far, an engine returns either a final answer or
/// a request to invoke a named action with arguments. Implementors must be
/// thread-safe (`Send + Sync`); the `Pin<Box<dyn Future>>` return keeps the
/// trait dyn-compatible so engines can be stored as `Arc<dyn ConversationEngine>`.
pub trait ConversationEngine: Send + Sync {
    fn step<'a>(
        &'a self,
        history: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<EngineStep, Error>> + Send + 'a>>;
}
