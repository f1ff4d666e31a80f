//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use relay_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    #[allow(dead_code)]
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn new(preset: PresetResponse) -> Self {
        let has_tool_call = preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        let mut events: VecDeque<_> = preset
            .events
            .into_iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg)
                }
                PresetEvent::ToolCall(req) => ModelResponseEvent::ToolCall(req),
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }));
        let sleep = preset
            .delay_ms
            .map(|delay_ms| Box::pin(sleep(Duration::from_millis(delay_ms))));
        Self { events, sleep }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
        }
        // Drained responses keep returning `None`.
        Poll::Ready(Ok(this.events.pop_front()))
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to queue the responses, which is how
/// the model should answer. Each request consumes the next queued response
/// in order. If the queue is empty, an error will be returned.
///
/// Every request is recorded, so tests can inspect what was sent after the
/// provider has been handed over. Clones share the same script and record.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
}

impl TestModelProvider {
    /// Queues the answer for the next unanswered request.
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        self.script
            .lock()
            .unwrap()
            .responses
            .push_back(preset);
    }

    /// Returns all requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    /// Returns the number of queued responses that were never requested.
    #[inline]
    pub fn remaining_responses(&self) -> usize {
        self.script.lock().unwrap().responses.len()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.script.lock().unwrap();
        script.requests.push(req.clone());
        let result = match script.responses.pop_front() {
            Some(PresetResponse {
                failure: Some(failure),
                ..
            }) => Err(Error {
                message: "preset failure",
                kind: failure.kind(),
            }),
            Some(preset) => Ok(TestModelResponse::new(preset)),
            None => Err(Error {
                message: "no enough responses",
                kind: ErrorKind::Other,
            }),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use relay_model::{ModelMessage, ToolCallRequest, ToolChoice};
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, ModelFinishReason) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(reason) => {
                    return (msg, tool_call, reason);
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, let me take a look.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "read_file".to_owned(),
                arguments: json!({ "filename": "todo.txt" }),
            }),
        ]));

        let req = ModelRequest::with_messages([ModelMessage::User(
            "Hi".to_owned(),
        )]);
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert!(tool_call.is_none());
        assert_eq!(reason, ModelFinishReason::Stop);

        let mut req = req.clone();
        req.tool_choice = ToolChoice::None;
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Sure, let me take a look.");
        assert_eq!(tool_call.unwrap().name, "read_file");
        assert_eq!(reason, ModelFinishReason::ToolCalls);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].tool_choice, ToolChoice::None);
        assert_eq!(provider.remaining_responses(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script() {
        let provider = TestModelProvider::default();
        let req = ModelRequest::with_messages(Vec::<ModelMessage>::new());
        let Err(err) = provider.send_request(&req).await else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_preset_failure() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::failing(PresetFailure::Moderated));
        let req = ModelRequest::with_messages(Vec::<ModelMessage>::new());
        let Err(err) = provider.send_request(&req).await else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), ErrorKind::Moderated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_response() {
        let provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("late").with_delay_ms(5_000));
        let req = ModelRequest::with_messages(Vec::<ModelMessage>::new());
        let resp = provider.send_request(&req).await.unwrap();

        let started = tokio::time::Instant::now();
        let (msg, _, _) = collect_response(resp).await;
        assert_eq!(msg, "late");
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
