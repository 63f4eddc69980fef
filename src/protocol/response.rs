use crate::error::ClientError;

use super::chat::CompletionResult;

/// Decode a buffered (non-streaming) completion body.
///
/// # Errors
///
/// Returns [`ClientError::Decode`] when the body is not a completion object.
pub fn parse_completion_response(body: &[u8]) -> Result<CompletionResult, ClientError> {
    serde_json::from_slice(body)
        .map_err(|err| ClientError::Decode(format!("invalid completion body: {err}")))
}
