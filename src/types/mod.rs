//! Wire shapes of the Responses API.
//!
//! Only the shapes the client core needs to drive every endpoint are modelled here.
//! Field names follow the wire (snake_case). Fields that real senders often omit are
//! still required in these types; [`crate::lenient`] fills them in before parsing.

pub mod config;
pub mod events;
pub mod input;
pub mod request;
pub mod response;

pub use config::{
    FunctionTool, ReasoningConfig, ReasoningEffort, ReasoningSummary, TextConfig, TextFormat,
    Tool, ToolChoice, ToolChoiceMode, Truncation,
};
pub use events::{Event, SkippableEvent};
pub use input::{Input, InputContent, InputItem, InputItemList, MessageContent, Role};
pub use request::{Include, Request, StreamOptions};
pub use response::{
    ApiError, ErrorEnvelope, IncompleteDetails, InputTokensDetails, ItemStatus, OutputContent,
    OutputItem, OutputTokensDetails, Response, Status, Usage,
};
