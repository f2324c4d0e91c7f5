//! Streaming events of the Responses API, discriminated by their `type` field.

use serde::{Deserialize, Serialize};

use super::response::{OutputContent, OutputItem, Response};

/// A decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The response was created
    #[serde(rename = "response.created")]
    ResponseCreated {
        response: Box<Response>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    /// The response is waiting to be processed (background mode)
    #[serde(rename = "response.queued")]
    ResponseQueued {
        response: Box<Response>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.in_progress")]
    ResponseInProgress {
        response: Box<Response>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.completed")]
    ResponseCompleted {
        response: Box<Response>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.failed")]
    ResponseFailed {
        response: Box<Response>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.incomplete")]
    ResponseIncomplete {
        response: Box<Response>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    /// A new output item was added
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        output_index: u32,
        item: OutputItem,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        output_index: u32,
        item: OutputItem,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        part: OutputContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    /// Text delta (text streaming)
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.refusal.delta")]
    RefusalDelta {
        item_id: String,
        output_index: u32,
        content_index: u32,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.refusal.done")]
    RefusalDone {
        item_id: String,
        output_index: u32,
        content_index: u32,
        refusal: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    /// Function call arguments delta (partial JSON string)
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        output_index: u32,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        item_id: String,
        output_index: u32,
        arguments: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    /// Reasoning summary delta
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta {
        item_id: String,
        output_index: u32,
        summary_index: u32,
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone {
        item_id: String,
        output_index: u32,
        summary_index: u32,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    /// An error event sent in-band by the server. Unlike a transport error frame it
    /// does not end the session by itself.
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        param: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },

    /// Any event type not listed above. Stream sessions drop these.
    #[serde(other)]
    Unknown,
}

impl Event {
    /// The response snapshot carried by lifecycle events.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Event::ResponseCreated { response, .. }
            | Event::ResponseQueued { response, .. }
            | Event::ResponseInProgress { response, .. }
            | Event::ResponseCompleted { response, .. }
            | Event::ResponseFailed { response, .. }
            | Event::ResponseIncomplete { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Text carried by a text delta event.
    pub fn text_delta(&self) -> Option<&str> {
        match self {
            Event::OutputTextDelta { delta, .. } => Some(delta),
            _ => None,
        }
    }

    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            Event::ResponseCreated { sequence_number, .. }
            | Event::ResponseQueued { sequence_number, .. }
            | Event::ResponseInProgress { sequence_number, .. }
            | Event::ResponseCompleted { sequence_number, .. }
            | Event::ResponseFailed { sequence_number, .. }
            | Event::ResponseIncomplete { sequence_number, .. }
            | Event::OutputItemAdded { sequence_number, .. }
            | Event::OutputItemDone { sequence_number, .. }
            | Event::ContentPartAdded { sequence_number, .. }
            | Event::ContentPartDone { sequence_number, .. }
            | Event::OutputTextDelta { sequence_number, .. }
            | Event::OutputTextDone { sequence_number, .. }
            | Event::RefusalDelta { sequence_number, .. }
            | Event::RefusalDone { sequence_number, .. }
            | Event::FunctionCallArgumentsDelta { sequence_number, .. }
            | Event::FunctionCallArgumentsDone { sequence_number, .. }
            | Event::ReasoningSummaryTextDelta { sequence_number, .. }
            | Event::ReasoningSummaryTextDone { sequence_number, .. }
            | Event::Error { sequence_number, .. } => *sequence_number,
            Event::Unknown => None,
        }
    }

    /// Whether this is one of the final lifecycle events of a response.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::ResponseCompleted { .. }
                | Event::ResponseFailed { .. }
                | Event::ResponseIncomplete { .. }
        )
    }
}

/// Events a stream session may drop without surfacing them.
pub trait SkippableEvent {
    fn is_skippable(&self) -> bool;
}

impl SkippableEvent for Event {
    fn is_skippable(&self) -> bool {
        matches!(self, Event::Unknown)
    }
}

impl SkippableEvent for serde_json::Value {
    fn is_skippable(&self) -> bool {
        false
    }
}
