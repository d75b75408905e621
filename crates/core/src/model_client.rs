use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use ragdeck_model::{
    GenerationEvent, GenerationRequest, GenerationStream, Generator,
    ProviderError,
};
use tracing::Instrument;

pub type EventResult = Result<GenerationEvent, Box<dyn ProviderError>>;
pub type EventStream = Pin<Box<dyn Stream<Item = EventResult> + Send>>;

type GenerateResult = Result<EventStream, Box<dyn ProviderError>>;
type BoxedGenerateFuture = Pin<Box<dyn Future<Output = GenerateResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(GenerationRequest) -> BoxedGenerateFuture + Send + Sync>;

/// A type-erased wrapper around a generator.
///
/// The agent only ever sees boxed event streams, so it doesn't need a
/// generic parameter for the generator type.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<G: Generator + 'static>(generator: G) -> Self {
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = generator.generate(&req);
            Box::pin(
                async move {
                    trace!("got a request: {req:?}");
                    match fut.await {
                        Ok(stream) => {
                            let events = Events {
                                inner: Box::pin(stream),
                                done: false,
                            };
                            Ok(Box::pin(events) as EventStream)
                        }
                        Err(err) => {
                            error!("got an error: {err:?}");
                            Err(Box::new(err) as Box<dyn ProviderError>)
                        }
                    }
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the stream of its events.
    ///
    /// Dropping the stream stops the underlying response.
    #[inline]
    pub async fn generate(&self, req: GenerationRequest) -> GenerateResult {
        (self.handler_fn)(req).await
    }
}

/// Adapts a [`GenerationStream`] to [`Stream`], ending it after the first
/// error.
struct Events<S> {
    inner: Pin<Box<S>>,
    done: bool,
}

impl<S: GenerationStream> Stream for Events<S> {
    type Item = EventResult;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        // `Events` is `Unpin` since the inner stream is boxed.
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next_event(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Some(event))) => {
                trace!("got an event: {event:?}");
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Ok(None)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Err(err)) => {
                error!("got an error: {err:?}");
                this.done = true;
                Poll::Ready(Some(Err(Box::new(err))))
            }
        }
    }
}
