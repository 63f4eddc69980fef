use crate::protocol::chat::DeltaChunk;

/// A data payload that did not decode as a delta chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChunk {
    pub payload: String,
    pub reason: String,
}

/// Result of decoding one data payload.
///
/// Decoding failures are recoverable: the caller records the skip and keeps
/// reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Decoded(DeltaChunk),
    Skipped(SkippedChunk),
}

/// Decode a `data:` payload into a [`DeltaChunk`].
#[must_use]
pub fn decode_chunk(payload: &str) -> ChunkOutcome {
    match serde_json::from_str::<DeltaChunk>(payload) {
        Ok(chunk) => ChunkOutcome::Decoded(chunk),
        Err(err) => ChunkOutcome::Skipped(SkippedChunk {
            payload: payload.to_owned(),
            reason: err.to_string(),
        }),
    }
}
