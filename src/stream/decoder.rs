use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc::UnboundedSender;

use crate::protocol::chat::CompletionResult;

use super::accumulator::Accumulator;
use super::chunk::{decode_chunk, ChunkOutcome};
use super::dispatch::{CallbackDispatcher, StreamEvent};
use super::frame::{classify_line, Frame};
use super::line::LineReader;
use super::StreamError;

/// Decode loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Reading,
    /// `data: [DONE]` was seen.
    Terminated,
    /// The body ended without a terminator.
    EndOfStream,
    /// The body failed to read.
    Failed,
}

/// Final value of a completed decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub result: CompletionResult,
    /// `true` only when the stream closed with `data: [DONE]`.
    pub terminated: bool,
    pub skipped_chunks: usize,
}

/// Longest prefix of a malformed payload written to the log.
const SKIPPED_PAYLOAD_LOG_BYTES: usize = 256;

/// Pull-based decoder for a chat completion event stream.
///
/// Each call to [`StreamDecoder::next_event`] reads lines until something
/// worth reporting happens: a content fragment or the terminator. Malformed
/// chunks are logged, counted and skipped. The body is owned by the decoder
/// and released when the decoder is dropped.
pub struct StreamDecoder<S> {
    lines: LineReader<S>,
    accumulator: Accumulator,
    state: DecodeState,
    skipped: usize,
    lines_read: usize,
}

impl<S, E> StreamDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(body: S) -> Self {
        Self::from_reader(LineReader::new(body))
    }

    #[must_use]
    pub fn with_max_line_bytes(body: S, max_line_bytes: usize) -> Self {
        Self::from_reader(LineReader::with_max_line_bytes(body, max_line_bytes))
    }

    fn from_reader(lines: LineReader<S>) -> Self {
        Self {
            lines,
            accumulator: Accumulator::new(),
            state: DecodeState::Reading,
            skipped: 0,
            lines_read: 0,
        }
    }

    /// Advance to the next event.
    ///
    /// Returns `Ok(None)` once the stream has terminated or ended; the
    /// sequence never restarts.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] when the body cannot be read. The decoder is
    /// then in [`DecodeState::Failed`] and yields nothing further.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, StreamError> {
        while self.state == DecodeState::Reading {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.state = DecodeState::EndOfStream;
                    tracing::debug!(
                        lines = self.lines_read,
                        chunks = self.accumulator.chunks_folded(),
                        skipped = self.skipped,
                        "completion stream ended without [DONE]"
                    );
                    return Ok(None);
                }
                Err(err) => {
                    self.state = DecodeState::Failed;
                    tracing::debug!("completion stream read failed: {err}");
                    return Err(err);
                }
            };
            self.lines_read += 1;

            match classify_line(&line) {
                Frame::Separator | Frame::Unrecognized => {}
                Frame::Terminator => {
                    self.state = DecodeState::Terminated;
                    tracing::debug!(
                        lines = self.lines_read,
                        chunks = self.accumulator.chunks_folded(),
                        skipped = self.skipped,
                        "completion stream terminated"
                    );
                    return Ok(Some(StreamEvent::Done));
                }
                Frame::Data(payload) => match decode_chunk(payload) {
                    ChunkOutcome::Decoded(chunk) => {
                        if let Some(fragment) = self.accumulator.fold(chunk) {
                            return Ok(Some(StreamEvent::Fragment(fragment)));
                        }
                    }
                    ChunkOutcome::Skipped(skipped) => {
                        tracing::warn!(
                            line = self.lines_read,
                            payload = payload_preview(&skipped.payload),
                            "skipping malformed stream chunk: {}",
                            skipped.reason
                        );
                        self.skipped += 1;
                    }
                },
            }
        }
        Ok(None)
    }

    /// Drive the decode to completion, handing every event to `on_event`.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] when the body cannot be read.
    pub async fn run<F>(mut self, mut on_event: F) -> Result<DecodeOutcome, StreamError>
    where
        F: FnMut(StreamEvent),
    {
        while let Some(event) = self.next_event().await? {
            on_event(event);
        }
        Ok(self.into_outcome())
    }

    /// Drive the decode to completion, forwarding every event to `events`.
    ///
    /// Sending never blocks; once the receiver is gone events are dropped and
    /// the decode carries on.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] when the body cannot be read.
    pub async fn forward(
        self,
        events: UnboundedSender<StreamEvent>,
    ) -> Result<DecodeOutcome, StreamError> {
        self.run(move |event| {
            let _ = events.send(event);
        })
        .await
    }

    #[must_use]
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Number of malformed chunks skipped so far.
    #[must_use]
    pub fn skipped_chunks(&self) -> usize {
        self.skipped
    }

    /// Snapshot of the completion assembled so far.
    #[must_use]
    pub fn result(&self) -> CompletionResult {
        self.accumulator.assemble()
    }

    #[must_use]
    pub fn into_outcome(self) -> DecodeOutcome {
        DecodeOutcome {
            terminated: self.state == DecodeState::Terminated,
            skipped_chunks: self.skipped,
            result: self.accumulator.into_result(),
        }
    }
}

fn payload_preview(payload: &str) -> &str {
    if payload.len() <= SKIPPED_PAYLOAD_LOG_BYTES {
        return payload;
    }
    let mut cut = SKIPPED_PAYLOAD_LOG_BYTES;
    while !payload.is_char_boundary(cut) {
        cut -= 1;
    }
    &payload[..cut]
}

/// Decode a completion stream without progress notifications.
///
/// # Errors
///
/// Returns a [`StreamError`] when the body cannot be read.
pub async fn decode_stream<S, E>(body: S) -> Result<CompletionResult, StreamError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    decode_stream_outcome(body).await.map(|outcome| outcome.result)
}

/// Decode a completion stream, reporting whether it closed with `[DONE]`.
///
/// # Errors
///
/// Returns a [`StreamError`] when the body cannot be read.
pub async fn decode_stream_outcome<S, E>(body: S) -> Result<DecodeOutcome, StreamError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    StreamDecoder::new(body).run(|_| {}).await
}

/// Decode a completion stream, invoking `notifier` with `(fragment, false)`
/// for each fragment and `("", true)` once when `[DONE]` arrives.
///
/// A stream that ends without `[DONE]` is not an error, but the finished
/// notification is never sent.
///
/// # Errors
///
/// Returns a [`StreamError`] when the body cannot be read.
pub async fn decode_stream_with_callback<S, E, F>(
    body: S,
    notifier: Option<F>,
) -> Result<CompletionResult, StreamError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(&str, bool),
{
    let mut dispatcher = CallbackDispatcher::new(notifier);
    let outcome = StreamDecoder::new(body)
        .run(|event| dispatcher.dispatch(&event))
        .await?;
    Ok(outcome.result)
}

/// Decode a completion stream, forwarding events to an unbounded channel.
///
/// # Errors
///
/// Returns a [`StreamError`] when the body cannot be read.
pub async fn decode_stream_to_channel<S, E>(
    body: S,
    events: UnboundedSender<StreamEvent>,
) -> Result<DecodeOutcome, StreamError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    StreamDecoder::new(body).forward(events).await
}
