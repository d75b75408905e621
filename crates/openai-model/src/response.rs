use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use ragdeck_model::{
    ErrorKind, FinishReason, GenerationEvent, GenerationStream,
    ToolCallRequest,
};
use serde_json::{Value, json};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    // Tool calls arrive in fragments keyed by `index`. They are only
    // emitted once the model has finished, when the arguments are complete.
    tool_calls: Vec<ToolCall>,
    emitted_tool_calls: usize,
    finish_reason: Option<FinishReason>,
    finish_emitted: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<GenerationEvent>, PartialState), Error>;

pin_project! {
    /// The event stream of a streamed chat completion.
    pub struct OpenAIStream {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIStream {
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            tool_calls: Default::default(),
            emitted_tool_calls: 0,
            finish_reason: None,
            finish_emitted: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl GenerationStream for OpenAIStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<GenerationEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        *this.next_event_fut = Some(Box::pin(next_event(partial_state)));
        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut state: PartialState) -> NextEvent {
    loop {
        // Once finished, flush tool calls and then the finish event.
        if let Some(reason) = state.finish_reason {
            if let Some(call) = state.tool_calls.get(state.emitted_tool_calls) {
                let request = to_tool_call_request(call, state.emitted_tool_calls);
                state.emitted_tool_calls += 1;
                return Ok((Some(GenerationEvent::ToolCall(request)), state));
            }
            if !state.finish_emitted {
                state.finish_emitted = true;
                return Ok((Some(GenerationEvent::Finished(reason)), state));
            }
            return Ok((None, state));
        }

        let sse_event = state.sse.next_event().await.map_err(|err| {
            Error::new(err.to_string(), ErrorKind::InvalidResponse)
        })?;
        let Some(sse_event) = sse_event.filter(|e| e != "[DONE]") else {
            // Some servers end the stream without a finish reason.
            state.finish_reason = Some(default_finish_reason(&state));
            continue;
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(err.to_string(), ErrorKind::InvalidResponse)
            })?;
        // Usage-only chunks have no choices.
        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };

        if let Some(tool_calls) = choice.delta.tool_calls {
            for tool_call in tool_calls {
                merge_tool_call(&mut state.tool_calls, tool_call);
            }
        }
        if let Some(reason) = choice.finish_reason {
            state.finish_reason = Some(match reason.as_str() {
                "length" => FinishReason::Length,
                _ => default_finish_reason(&state),
            });
        }
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            return Ok((Some(GenerationEvent::TextDelta(content)), state));
        }
    }
}

#[inline]
fn default_finish_reason(state: &PartialState) -> FinishReason {
    // Gemini reports `stop` even when it asks for tools.
    if state.tool_calls.is_empty() {
        FinishReason::Stop
    } else {
        FinishReason::ToolCalls
    }
}

fn merge_tool_call(partials: &mut Vec<ToolCall>, tool_call: ToolCall) {
    let existing = tool_call
        .index
        .and_then(|idx| partials.iter_mut().find(|t| t.index == Some(idx)));
    let Some(partial) = existing else {
        partials.push(tool_call);
        return;
    };

    if let Some(id) = tool_call.id {
        partial.id.get_or_insert_default().push_str(&id);
    }
    if let Some(function) = tool_call.function {
        let partial_func = partial.function.get_or_insert(
            crate::proto::FunctionToolCall {
                name: None,
                arguments: None,
            },
        );
        if let Some(name) = function.name {
            partial_func.name.get_or_insert_default().push_str(&name);
        }
        if let Some(arguments) = function.arguments {
            partial_func
                .arguments
                .get_or_insert_default()
                .push_str(&arguments);
        }
    }
}

fn to_tool_call_request(call: &ToolCall, position: usize) -> ToolCallRequest {
    let id = call
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("call_{position}"));
    let function = call.function.as_ref();
    let name = function.and_then(|f| f.name.clone()).unwrap_or_default();
    let raw_arguments = function
        .and_then(|f| f.arguments.as_deref())
        .map(str::trim)
        .unwrap_or_default();
    let arguments = if raw_arguments.is_empty() {
        json!({})
    } else {
        serde_json::from_str::<Value>(raw_arguments).unwrap_or_else(|err| {
            warn!("malformed arguments for tool `{name}`: {err}");
            Value::String(raw_arguments.to_owned())
        })
    };
    ToolCallRequest {
        id,
        name,
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;

    use super::*;
    use crate::io::Chunks;

    async fn collect(
        body: &'static [u8],
    ) -> Result<Vec<GenerationEvent>, Error> {
        let chunks = Chunks::from_vec_deque(vec![Bytes::from_static(body)].into());
        let mut stream = pin!(OpenAIStream::from_sse(Sse::new(chunks)));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| stream.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_text_and_tool_calls() {
        let events =
            collect(include_bytes!("../fixtures/tool_call_stream.txt"))
                .await
                .unwrap();

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::TextDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Checking both tickers.");

        let calls: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                GenerationEvent::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name, "get_current_stock_price");
        assert_eq!(calls[0].arguments, json!({ "symbol": "NVDA" }));
        assert_eq!(calls[1].arguments, json!({ "symbol": "AMD" }));

        assert_eq!(
            events.last(),
            Some(&GenerationEvent::Finished(FinishReason::ToolCalls))
        );
    }

    #[tokio::test]
    async fn test_content_with_finish_reason() {
        let events = collect(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n\
              data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":\"stop\"}]}\n\n\
              data: [DONE]\n\n",
        )
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![
                GenerationEvent::TextDelta("Hi".to_owned()),
                GenerationEvent::TextDelta(" there".to_owned()),
                GenerationEvent::Finished(FinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_without_finish_reason() {
        let events = collect(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        )
        .await
        .unwrap();
        assert_eq!(
            events.last(),
            Some(&GenerationEvent::Finished(FinishReason::Stop))
        );
    }

    #[tokio::test]
    async fn test_malformed_chunk() {
        let err = collect(b"data: {not json}\n\n").await.unwrap_err();
        assert_eq!(
            ragdeck_model::ProviderError::kind(&err),
            ErrorKind::InvalidResponse
        );
    }
}
