//! Incremental decoding of `text/event-stream` chat completion bodies.
//!
//! The pipeline runs one line at a time on the caller's task:
//! [`line::LineReader`] splits the body into lines, [`frame::classify_line`]
//! recognises data frames and the `[DONE]` terminator, [`chunk::decode_chunk`]
//! turns payloads into delta chunks, and [`accumulator::Accumulator`] folds
//! them into a [`CompletionResult`](crate::protocol::chat::CompletionResult).
pub mod accumulator;
pub mod chunk;
pub mod decoder;
pub mod dispatch;
pub mod frame;
pub mod line;

pub use accumulator::Accumulator;
pub use chunk::{decode_chunk, ChunkOutcome, SkippedChunk};
pub use decoder::{
    decode_stream, decode_stream_outcome, decode_stream_to_channel, decode_stream_with_callback,
    DecodeOutcome, DecodeState, StreamDecoder,
};
pub use dispatch::{CallbackDispatcher, StreamEvent};
pub use frame::{classify_line, Frame};
pub use line::{LineReader, DEFAULT_MAX_LINE_BYTES};

/// Hard failure while reading a completion stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to read completion stream: {0}")]
    Read(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}
