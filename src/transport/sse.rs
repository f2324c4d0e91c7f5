//! Server-sent event framing (Bytes -> Frame).
//!
//! Line parsing is done by `eventsource-stream`. On top of it:
//! - a `[DONE]` data frame ends the stream
//! - a read or parse error becomes one `Frame::Error` and ends the stream

use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{stream, StreamExt};

use super::{Frame, FrameStream, SseEvent, StreamFailure};
use crate::BoxStream;

const DONE_SIGNAL: &str = "[DONE]";

/// Split a byte stream into SSE frames.
pub fn decode_frames(input: BoxStream<'static, Bytes>) -> FrameStream {
    let events = Box::pin(input.eventsource());

    let frames = stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        match events.next().await? {
            Ok(event) => {
                if event.data.trim() == DONE_SIGNAL {
                    return None;
                }
                let frame = Frame::Event(SseEvent {
                    event: Some(event.event).filter(|name| !name.is_empty()),
                    data: Some(event.data),
                    id: Some(event.id).filter(|id| !id.is_empty()),
                });
                Some((frame, Some(events)))
            }
            Err(EventStreamError::Transport(e)) => {
                Some((Frame::Error(StreamFailure::from_error(&e)), None))
            }
            Err(e) => {
                let failure = StreamFailure {
                    status: None,
                    body: None,
                    message: format!("malformed event stream: {}", e),
                };
                Some((Frame::Error(failure), None))
            }
        }
    });

    Box::pin(frames)
}
