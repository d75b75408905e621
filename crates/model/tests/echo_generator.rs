use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use ragdeck_model::{
    Embedder, Embedding, ErrorKind, FinishReason, GenerationEvent,
    GenerationRequest, GenerationStream, Generator, Message, ProviderError,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct EchoError(ErrorKind);

impl Display for EchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for EchoError {}

impl ProviderError for EchoError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Repeats the last user message word by word.
struct EchoStream {
    words: VecDeque<String>,
    finished: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EchoStream {
    fn new(input: &str) -> Self {
        Self {
            words: format!("You said {input}")
                .split(' ')
                .map(ToString::to_string)
                .collect(),
            finished: false,
            sleep: None,
        }
    }
}

impl GenerationStream for EchoStream {
    type Error = EchoError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<GenerationEvent>, Self::Error>> {
        // `EchoStream` is `Unpin`.
        let this = self.get_mut();
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(Duration::from_millis(1))));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        if let Some(mut word) = this.words.pop_front() {
            if !this.words.is_empty() {
                word.push(' ');
            }
            return Poll::Ready(Ok(Some(GenerationEvent::TextDelta(word))));
        }
        if !this.finished {
            this.finished = true;
            return Poll::Ready(Ok(Some(GenerationEvent::Finished(
                FinishReason::Stop,
            ))));
        }
        Poll::Ready(Ok(None))
    }
}

struct EchoGenerator;

impl Generator for EchoGenerator {
    type Error = EchoError;
    type Stream = EchoStream;

    fn generate(
        &self,
        req: &GenerationRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let last_user = req.messages.iter().rev().find_map(|msg| match msg {
            Message::User(text) => Some(text.as_str()),
            _ => None,
        });
        ready(match last_user {
            Some(text) => Ok(EchoStream::new(text)),
            None => Err(EchoError(ErrorKind::Other)),
        })
    }
}

struct LengthEmbedder;

impl Embedder for LengthEmbedder {
    type Error = EchoError;

    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Embedding, Self::Error>> + Send + 'static
    {
        ready(Ok(vec![text.len() as f32, 1.0]))
    }
}

mod tests {
    use std::future::poll_fn;

    use super::*;

    #[tokio::test]
    async fn test_streamed_text() {
        let generator = EchoGenerator;
        let req = GenerationRequest {
            messages: vec![
                Message::System("Be brief.".to_string()),
                Message::User("Good morning".to_string()),
            ],
            tools: vec![],
        };
        let mut stream = generator.generate(&req).await.unwrap();

        let mut text = String::new();
        let mut finish_reason = None;
        loop {
            let next = poll_fn(|cx| Pin::new(&mut stream).poll_next_event(cx));
            match next.await {
                Ok(Some(GenerationEvent::TextDelta(delta))) => {
                    text.push_str(&delta);
                }
                Ok(Some(GenerationEvent::Finished(reason))) => {
                    finish_reason = Some(reason);
                }
                Ok(Some(event)) => unreachable!("unexpected event: {event:?}"),
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        assert_eq!(text, "You said Good morning");
        assert_eq!(finish_reason, Some(FinishReason::Stop));

        // Polling after completion keeps returning `None`.
        let next = poll_fn(|cx| Pin::new(&mut stream).poll_next_event(cx));
        assert!(next.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_kind() {
        let generator = EchoGenerator;
        let err = generator
            .generate(&GenerationRequest::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_embed() {
        let embedding = LengthEmbedder.embed("four").await.unwrap();
        assert_eq!(embedding, vec![4.0, 1.0]);
    }
}
