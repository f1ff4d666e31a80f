use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use relay_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{ChatCompletionChunk, ToolCallDelta};

#[derive(Default)]
struct PartialToolCall {
    index: Option<u32>,
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn patch(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id {
            self.id.push_str(&id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                self.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    fn to_request(&self) -> ToolCallRequest {
        ToolCallRequest {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: serde_json::from_str::<Value>(&self.arguments)
                .unwrap_or_default(),
        }
    }
}

struct PartialState {
    sse: Sse,
    id: Option<String>,
    tool_calls: Vec<PartialToolCall>,
    // Tool call arguments arrive in pieces, so calls are only emitted once
    // the stream reports a finish reason.
    pending_events: VecDeque<ModelResponseEvent>,
    finished: bool,
}

impl PartialState {
    fn finish(&mut self, reason: ModelFinishReason) {
        for tool_call in &self.tool_calls {
            self.pending_events
                .push_back(ModelResponseEvent::ToolCall(tool_call.to_request()));
        }
        self.pending_events
            .push_back(ModelResponseEvent::Completed(reason));
        self.finished = true;
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            tool_calls: Default::default(),
            pending_events: Default::default(),
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
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

        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

fn finish_reason_from(value: &str) -> ModelFinishReason {
    match value {
        "tool_calls" | "function_call" => ModelFinishReason::ToolCalls,
        "length" => ModelFinishReason::Length,
        _ => ModelFinishReason::Stop,
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.finished {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Some servers close the stream without a finish reason.
                partial_state.finish(ModelFinishReason::Stop);
                continue;
            }
            Err(SseError::Chunks(err)) => {
                return Err(Error::new(err.message, err.kind));
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.finish(ModelFinishReason::Stop);
            continue;
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        }

        // Usage-only chunks carry no choices.
        for choice in chunk.choices {
            if let Some(reasoning) = &choice.delta.reasoning_content {
                trace!("reasoning delta: {reasoning}");
            }
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    partial_state
                        .pending_events
                        .push_back(ModelResponseEvent::MessageDelta(content));
                }
            }
            for delta in choice.delta.tool_calls.into_iter().flatten() {
                let position = partial_state
                    .tool_calls
                    .iter()
                    .position(|t| t.index == delta.index);
                let partial = match position {
                    Some(position) => &mut partial_state.tool_calls[position],
                    None => {
                        partial_state.tool_calls.push(PartialToolCall {
                            index: delta.index,
                            ..Default::default()
                        });
                        let last = partial_state.tool_calls.len() - 1;
                        &mut partial_state.tool_calls[last]
                    }
                };
                partial.patch(delta);
            }
            if let Some(finish_reason) = choice.finish_reason {
                partial_state.finish(finish_reason_from(&finish_reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn collect(chunks: Vec<Bytes>) -> Vec<ModelResponseEvent> {
        let sse = Sse::new(Chunks::from_vec_deque(chunks.into()));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_simple_events() {
        let events = collect(vec![Bytes::from_static(include_bytes!(
            "../fixtures/test_response.txt"
        ))])
        .await;

        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "```json\n[{\"name\": \"search_google\"}]\n```");

        let tool_calls: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::ToolCall(req) => Some(req),
                _ => None,
            })
            .collect();
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0].name, "search_google");
        assert_eq!(tool_calls[0].arguments, json!({ "query": "流感" }));
        assert_eq!(tool_calls[1].name, "analyze_sentiment");

        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::ToolCalls))
        );
    }

    #[tokio::test]
    async fn test_stream_without_finish_reason() {
        let events = collect(vec![
            Bytes::from_static(
                b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n",
            ),
            Bytes::from_static(b"data: [DONE]\n\n"),
        ])
        .await;
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Hi".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_mismatched_chunk_id() {
        let sse = Sse::new(Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b"data: {\"id\":\"a\",\"choices\":[]}\n\ndata: {\"id\":\"b\",\"choices\":[]}\n\n",
            )]
            .into(),
        ));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "chunk id mismatch");
    }
}
