use std::fmt::{self, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use relay_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tokio::time::timeout;
use tracing::Instrument;

type SendRequestResult = Result<Completion, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Wraps `provider`.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and waits for the whole response, giving up after
    /// `limit`.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn complete(
        &self,
        req: ModelRequest,
        limit: Duration,
    ) -> Result<Completion, CompletionError> {
        match timeout(limit, (self.handler_fn)(req)).await {
            Ok(Ok(completion)) => Ok(completion),
            Ok(Err(err)) => Err(CompletionError::Provider(err)),
            Err(_) => Err(CompletionError::Timeout(limit)),
        }
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    /// The concatenated assistant text.
    pub text: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

/// The reason a completion could not be obtained.
#[derive(Debug)]
pub enum CompletionError {
    /// The whole response did not arrive within the given duration.
    Timeout(Duration),
    /// The provider reported an error.
    Provider(Box<dyn ModelProviderError>),
}

impl Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::Timeout(limit) => {
                write!(f, "no response within {}s", limit.as_secs_f64())
            }
            CompletionError::Provider(err) => {
                write!(f, "{err} ({})", err.kind())
            }
        }
    }
}

impl std::error::Error for CompletionError {}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut completion = Completion::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                completion.text.push_str(&msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                completion.tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                completion.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(completion)
}
