//! Local fakes of the model contracts for testing purpose.

mod embedder;
mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use ragdeck_model::{
    ErrorKind, FinishReason, GenerationEvent, GenerationRequest,
    GenerationStream, Generator, ProviderError,
};
use tokio::time::{Sleep, sleep};

pub use embedder::HashEmbedder;
pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl ProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct ScriptedStream {
    events: VecDeque<PresetEvent>,
    finish_reason: Option<FinishReason>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl GenerationStream for ScriptedStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<GenerationEvent>, Self::Error>> {
        // `ScriptedStream` is `Unpin`.
        let this = self.get_mut();
        if this.events.is_empty() && this.finish_reason.is_none() {
            return Poll::Ready(Ok(None));
        }

        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let event = match this.events.pop_front() {
            Some(PresetEvent::TextDelta(delta)) => {
                GenerationEvent::TextDelta(delta)
            }
            Some(PresetEvent::ToolCall(req)) => GenerationEvent::ToolCall(req),
            Some(PresetEvent::Fail(message)) => {
                this.events.clear();
                this.finish_reason = None;
                return Poll::Ready(Err(Error::new(message, ErrorKind::Other)));
            }
            None => match this.finish_reason.take() {
                Some(reason) => GenerationEvent::Finished(reason),
                None => return Poll::Ready(Ok(None)),
            },
        };
        Poll::Ready(Ok(Some(event)))
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    failed_attempts: u64,
    requests: Vec<GenerationRequest>,
}

/// A scripted generator for testing purpose.
///
/// Each call to `generate` consumes the next preset response in the order
/// they were added. A response with `failures` set makes the request fail
/// that many times before it is consumed. When the script runs out, every
/// request fails.
///
/// Clones share the same script, so a test can keep one clone to inspect
/// the received requests after handing another to the code under test.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().responses.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panicking test may poison the lock; the script is still usable.
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn next_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<ScriptedStream, Error> {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let Some(failures) =
            script.responses.front().map(|preset| preset.failures)
        else {
            return Err(Error::new("script exhausted", ErrorKind::Other));
        };
        match failures {
            Some(0) => {
                return Err(Error::new(
                    "preset failure",
                    ErrorKind::RateLimitExceeded,
                ));
            }
            Some(failures) if script.failed_attempts < failures => {
                script.failed_attempts += 1;
                return Err(Error::new(
                    "preset failure",
                    ErrorKind::RateLimitExceeded,
                ));
            }
            _ => {}
        }

        script.failed_attempts = 0;
        let Some(preset) = script.responses.pop_front() else {
            return Err(Error::new("script exhausted", ErrorKind::Other));
        };
        let has_tool_call = preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        Ok(ScriptedStream {
            events: preset.events.into(),
            finish_reason: Some(if has_tool_call {
                FinishReason::ToolCalls
            } else {
                FinishReason::Stop
            }),
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        })
    }
}

impl Generator for ScriptedGenerator {
    type Error = crate::Error;
    type Stream = ScriptedStream;

    fn generate(
        &self,
        req: &GenerationRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        ready(self.next_stream(req))
    }
}

impl Debug for ScriptedGenerator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedGenerator")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use ragdeck_model::{Message, ToolCallRequest, ToolSpec};
    use serde_json::json;

    use super::*;

    async fn collect_stream(
        stream: ScriptedStream,
    ) -> Result<(String, Vec<ToolCallRequest>, Option<FinishReason>), Error>
    {
        let mut stream = pin!(stream);
        let mut text = String::new();
        let mut tool_calls = vec![];
        let mut finish_reason = None;
        while let Some(event) =
            poll_fn(|cx| stream.as_mut().poll_next_event(cx)).await?
        {
            match event {
                GenerationEvent::TextDelta(delta) => text.push_str(&delta),
                GenerationEvent::ToolCall(req) => tool_calls.push(req),
                GenerationEvent::Finished(reason) => {
                    finish_reason = Some(reason)
                }
            }
        }
        Ok((text, tool_calls, finish_reason))
    }

    fn user_request(text: &str) -> GenerationRequest {
        GenerationRequest {
            messages: vec![Message::User(text.to_owned())],
            tools: vec![ToolSpec {
                name: "get_current_stock_price".to_owned(),
                description: "Gets the latest price".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": { "symbol": { "type": "string" } }
                }),
            }],
        }
    }

    #[tokio::test]
    async fn test_scripted_turns() {
        let mut generator = ScriptedGenerator::default();
        generator.add_response(PresetResponse::with_text("Hello, world!"));
        generator.add_response(PresetResponse::with_events([
            PresetEvent::TextDelta("Let me look.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call:1".to_owned(),
                name: "get_current_stock_price".to_owned(),
                arguments: json!({ "symbol": "AAPL" }),
            }),
        ]));

        let stream = generator.generate(&user_request("Hi")).await.unwrap();
        let (text, tool_calls, reason) = collect_stream(stream).await.unwrap();
        assert_eq!(text, "Hello, world!");
        assert!(tool_calls.is_empty());
        assert_eq!(reason, Some(FinishReason::Stop));

        let stream = generator
            .generate(&user_request("Price of AAPL?"))
            .await
            .unwrap();
        let (text, tool_calls, reason) = collect_stream(stream).await.unwrap();
        assert_eq!(text, "Let me look.");
        assert_eq!(tool_calls[0].arguments, json!({ "symbol": "AAPL" }));
        assert_eq!(reason, Some(FinishReason::ToolCalls));

        assert!(generator.generate(&user_request("More?")).await.is_err());
        assert_eq!(generator.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_failures() {
        let mut generator = ScriptedGenerator::default();
        generator
            .add_response(PresetResponse::with_text("finally").with_failures(2));

        for _ in 0..2 {
            let err = generator.generate(&user_request("Hi")).await.err();
            assert_eq!(err.unwrap().kind(), ErrorKind::RateLimitExceeded);
        }
        let stream = generator.generate(&user_request("Hi")).await.unwrap();
        let (text, _, _) = collect_stream(stream).await.unwrap();
        assert_eq!(text, "finally");
    }

    #[tokio::test]
    async fn test_fail_mid_stream() {
        let mut generator = ScriptedGenerator::default();
        generator.add_response(PresetResponse::with_events([
            PresetEvent::TextDelta("partial".to_owned()),
            PresetEvent::Fail("connection reset".to_owned()),
        ]));

        let stream = generator.generate(&user_request("Hi")).await.unwrap();
        let err = collect_stream(stream).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }
}
