//! Line splitting over an HTTP body byte stream.
//!
//! Bytes may arrive split at arbitrary boundaries; only complete lines are
//! handed out. A trailing `\r` is stripped so CRLF-framed streams classify the
//! same as LF-framed ones.
use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use std::pin::Pin;

use super::StreamError;

/// Longest line accepted before the reader gives up on the stream.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reads a byte stream one logical line at a time.
///
/// Once the stream has ended or failed the reader is exhausted and yields
/// `Ok(None)` forever.
pub struct LineReader<S> {
    inner: Pin<Box<S>>,
    buffer: BytesMut,
    scan_from: usize,
    max_line_bytes: usize,
    exhausted: bool,
}

impl<S, E> LineReader<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self::with_max_line_bytes(inner, DEFAULT_MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_max_line_bytes(inner: S, max_line_bytes: usize) -> Self {
        Self {
            inner: Box::pin(inner),
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
            max_line_bytes: max_line_bytes.max(1),
            exhausted: false,
        }
    }

    /// Read the next line without its terminator.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Read`] when the underlying stream fails and
    /// [`StreamError::LineTooLong`] when a line exceeds the configured limit.
    pub async fn next_line(&mut self) -> Result<Option<String>, StreamError> {
        loop {
            if let Some(line) = self.take_buffered_line()? {
                return Ok(Some(line));
            }
            if self.exhausted {
                return Ok(None);
            }
            // The buffer now holds one unterminated line.
            if line_content_len(&self.buffer) > self.max_line_bytes {
                return Err(self.line_too_long());
            }

            match self.inner.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    self.fail();
                    return Err(StreamError::Read(Box::new(err)));
                }
                None => {
                    self.exhausted = true;
                    return self.take_trailing_line();
                }
            }
        }
    }

    fn take_buffered_line(&mut self) -> Result<Option<String>, StreamError> {
        let Some(rel_pos) = memchr(b'\n', &self.buffer[self.scan_from..]) else {
            self.scan_from = self.buffer.len();
            return Ok(None);
        };
        let line_end = self.scan_from + rel_pos;
        if line_content_len(&self.buffer[..line_end]) > self.max_line_bytes {
            return Err(self.line_too_long());
        }
        let line = self.buffer.split_to(line_end);
        self.buffer.advance(1);
        self.scan_from = 0;
        Ok(Some(decode_line(&line)))
    }

    fn take_trailing_line(&mut self) -> Result<Option<String>, StreamError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        if line_content_len(&self.buffer) > self.max_line_bytes {
            return Err(self.line_too_long());
        }
        let line = self.buffer.split();
        self.scan_from = 0;
        Ok(Some(decode_line(&line)))
    }

    fn line_too_long(&mut self) -> StreamError {
        self.fail();
        StreamError::LineTooLong {
            limit: self.max_line_bytes,
        }
    }

    fn fail(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
        self.scan_from = 0;
    }
}

fn line_content_len(raw: &[u8]) -> usize {
    raw.strip_suffix(b"\r").unwrap_or(raw).len()
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
