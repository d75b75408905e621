use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// The events produced for one generation request.
pub trait GenerationStream: Sized + Send + 'static {
    /// The error type that may be returned while streaming.
    type Error: ProviderError;

    /// Attempts to pull out the next event.
    ///
    /// # Return value
    ///
    /// - `Poll::Pending` means the next event is not available yet. The
    ///   current task will be woken when it may be.
    /// - `Poll::Ready(Ok(Some(event)))` delivers an event; more may follow.
    /// - `Poll::Ready(Ok(None))` means the stream has completed.
    /// - `Poll::Ready(Err(error))` means generation failed. No further
    ///   events will be produced.
    ///
    /// Calling this method after completion always returns `Ok(None)`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<GenerationEvent>, Self::Error>>;
}

/// The reason why generation has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinishReason {
    /// The model wants the tool calls it emitted to be run.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
    /// The output was cut by a token limit.
    Length,
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The arguments object to pass to the tool.
    pub arguments: Value,
}

/// An event from a generation stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationEvent {
    /// Received a fragment of text.
    TextDelta(String),
    /// Received a complete tool call request.
    ToolCall(ToolCallRequest),
    /// Generation has finished.
    Finished(FinishReason),
}
