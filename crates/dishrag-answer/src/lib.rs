//! Answers a selected question from a local or hosted model, grounded in a
//! rules document and, optionally, the rest of the corpus.

pub mod engine;
mod parse;
mod pipeline;
mod prompt;

pub use engine::{
    BackendKind, Dispatcher, HostedBackend, InferenceBackend, InferenceError, InferenceRequest,
    LocalBackend,
};
pub use parse::strip_reasoning;
pub use pipeline::{
    editor_reply, Answer, AnswerError, AnswerMode, Answerer, EditorReply, Stage,
    FAILURE_PLACEHOLDER,
};
pub use prompt::{assemble, PromptPayload};
