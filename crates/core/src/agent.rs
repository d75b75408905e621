mod builder;
#[cfg(test)]
mod tests;

use std::fmt::{self, Debug, Display};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures_util::{Stream, StreamExt};
use ragdeck_knowledge::KnowledgeBase;
use ragdeck_model::{
    ErrorKind as ModelErrorKind, FinishReason, GenerationEvent,
    GenerationRequest, Message, ProviderError, ToolOutput,
};
use serde_json::Value;

use crate::knowledge::search_passages;
use crate::model_client::ModelClient;
use crate::tool::Executor;
use crate::tool::executor::render_result;
pub use builder::AgentBuilder;

/// An agent pairs a generator with tools and, optionally, a knowledge base.
///
/// Cloning is cheap. Every call to [`answer`](Agent::answer) starts from a
/// fresh conversation, no history is kept between answers.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    name: String,
    model_client: ModelClient,
    executor: Executor,
    system_prompt: String,
    references: Option<KnowledgeBase>,
    knowledge_top_k: usize,
    max_tool_rounds: usize,
    show_tool_calls: bool,
}

impl Agent {
    /// Returns the agent's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the system prompt sent with every request.
    #[inline]
    pub fn system_prompt(&self) -> &str {
        &self.inner.system_prompt
    }

    /// Returns `true` if both handles refer to the same agent.
    #[inline]
    pub fn ptr_eq(&self, other: &Agent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Answers `query`, streaming text fragments as the model produces
    /// them.
    ///
    /// Nothing is sent until the returned stream is polled. Tool calls
    /// requested by the model are executed in between, and their output
    /// is fed back until the model stops asking for tools. Agents built
    /// with `show_tool_calls` announce each call before it runs. The stream
    /// ends after the first error.
    pub fn answer<S: Into<String>>(&self, query: S) -> Answer {
        let inner = Arc::clone(&self.inner);
        let query = query.into();
        let stream = stream! {
            debug!("{} answering {query:?}", inner.name);
            let mut messages = vec![
                Message::System(inner.system_prompt.clone()),
                Message::User(inner.user_message(query).await),
            ];
            let tools = inner.executor.specs();
            let mut rounds = 0;

            loop {
                let req = GenerationRequest {
                    messages: messages.clone(),
                    tools: tools.clone(),
                };
                let mut events = match inner.model_client.generate(req).await {
                    Ok(events) => events,
                    Err(err) => {
                        yield Err(AgentError::from_provider(err.as_ref()));
                        break;
                    }
                };

                let mut content = String::new();
                let mut tool_calls = vec![];
                let mut finish_reason = None;
                let mut failure = None;
                while let Some(event) = events.next().await {
                    match event {
                        Ok(GenerationEvent::TextDelta(delta)) => {
                            content.push_str(&delta);
                            yield Ok(AnswerEvent::Text(delta));
                        }
                        Ok(GenerationEvent::ToolCall(req)) => {
                            tool_calls.push(req);
                        }
                        Ok(GenerationEvent::Finished(reason)) => {
                            finish_reason = Some(reason);
                        }
                        Err(err) => {
                            failure =
                                Some(AgentError::from_provider(err.as_ref()));
                            break;
                        }
                    }
                }
                if let Some(err) = failure {
                    yield Err(err);
                    break;
                }

                if finish_reason == Some(FinishReason::Length) {
                    warn!("{} hit the output length limit", inner.name);
                }
                if finish_reason != Some(FinishReason::ToolCalls)
                    || tool_calls.is_empty()
                {
                    break;
                }
                if rounds == inner.max_tool_rounds {
                    yield Err(AgentError::tool_rounds_exceeded(rounds));
                    break;
                }
                rounds += 1;

                debug!("{} running {} tool(s)", inner.name, tool_calls.len());
                messages.push(Message::Assistant {
                    content,
                    tool_calls: tool_calls.clone(),
                });
                for call in tool_calls {
                    if inner.show_tool_calls {
                        yield Ok(AnswerEvent::ToolCall(ToolInvocation {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        }));
                    }
                    let call_id = call.id.clone();
                    let result = inner.executor.execute(call).await;
                    if let Err(err) = &result {
                        debug!("tool call {call_id} failed: {err}");
                    }
                    messages.push(Message::Tool(ToolOutput {
                        call_id,
                        content: render_result(&result),
                    }));
                }
            }
        };
        Answer {
            inner: Box::pin(stream),
        }
    }
}

impl AgentInner {
    /// Adds knowledge base references to the query when enabled. A failed
    /// search only drops the references.
    async fn user_message(&self, query: String) -> String {
        let Some(knowledge) = &self.references else {
            return query;
        };
        let passages =
            match search_passages(knowledge, &query, self.knowledge_top_k).await
            {
                Ok(passages) => passages,
                Err(err) => {
                    warn!("failed to search references: {err}");
                    return query;
                }
            };
        if passages.is_empty() {
            return query;
        }
        let references = match serde_json::to_string_pretty(&passages) {
            Ok(references) => references,
            Err(err) => {
                warn!("failed to encode references: {err}");
                return query;
            }
        };
        format!(
            "{query}\n\nUse the following references from the knowledge base \
             if they help answer the question.\n\
             <references>\n{references}\n</references>"
        )
    }
}

impl Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.inner.name)
            .field("max_tool_rounds", &self.inner.max_tool_rounds)
            .field("show_tool_calls", &self.inner.show_tool_calls)
            .finish_non_exhaustive()
    }
}

/// An item of an [`Answer`].
#[derive(Clone, Debug, PartialEq)]
pub enum AnswerEvent {
    /// A fragment of the model's text.
    Text(String),
    /// A tool is about to run.
    ToolCall(ToolInvocation),
}

/// A tool call announced by an agent built with `show_tool_calls`.
///
/// Displays as `name(arg, ...)` with the argument values in order.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    /// The name of the tool.
    pub name: String,
    /// The arguments as sent by the model.
    pub arguments: Value,
}

impl Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parsed;
        let arguments = match &self.arguments {
            Value::String(raw) => {
                parsed = serde_json::from_str(raw)
                    .unwrap_or_else(|_| Value::String(raw.clone()));
                &parsed
            }
            arguments => arguments,
        };
        let values: Vec<String> = match arguments {
            Value::Null => vec![],
            Value::Object(map) => map.values().map(render_argument).collect(),
            value => vec![render_argument(value)],
        };
        write!(f, "{}({})", self.name, values.join(", "))
    }
}

fn render_argument(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        value => value.to_string(),
    }
}

/// The streamed answer to one query.
///
/// Yields events in the order the model produced them. The stream is
/// finite and cannot be restarted.
pub struct Answer {
    inner: Pin<Box<dyn Stream<Item = Result<AnswerEvent, AgentError>> + Send>>,
}

impl Answer {
    /// Drains the stream and returns the whole text.
    pub async fn text(mut self) -> Result<String, AgentError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            if let AnswerEvent::Text(fragment) = event? {
                text.push_str(&fragment);
            }
        }
        Ok(text)
    }
}

impl Stream for Answer {
    type Item = Result<AnswerEvent, AgentError>;

    #[inline]
    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Answer").finish_non_exhaustive()
    }
}

/// The kind of [`AgentError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentErrorKind {
    /// The generator failed.
    Model(ModelErrorKind),
    /// The model kept asking for tools after the configured number of
    /// rounds.
    ToolRoundsExceeded,
}

/// An error that ends an [`Answer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentError {
    kind: AgentErrorKind,
    message: String,
}

impl AgentError {
    fn from_provider(err: &dyn ProviderError) -> Self {
        Self {
            kind: AgentErrorKind::Model(err.kind()),
            message: err.to_string(),
        }
    }

    fn tool_rounds_exceeded(rounds: usize) -> Self {
        Self {
            kind: AgentErrorKind::ToolRoundsExceeded,
            message: format!("gave up after {rounds} rounds of tool calls"),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> AgentErrorKind {
        self.kind
    }
}

impl Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AgentError {}
