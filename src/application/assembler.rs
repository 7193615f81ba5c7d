//! Per-connection framing for the raw stream listener.
//!
//! The stream transport has no message boundaries: a connection's lifetime is
//! the frame. Bytes are accumulated in arrival order and interpreted as one
//! document when the peer closes its side.

use std::str::Utf8Error;

use bytes::BytesMut;
use thiserror::Error;

use crate::domain::document::{Document, is_blank};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Accumulating,
    Completed,
    Aborted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not valid UTF-8: {0}")]
    Undecodable(#[from] Utf8Error),
    #[error("frame already {0:?}")]
    Finished(FrameState),
}

#[derive(Debug)]
pub struct FrameAssembler {
    state: FrameState,
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            state: FrameState::Accumulating,
            buffer: BytesMut::new(),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Scratch buffer for reading directly off the socket.
    pub(crate) fn buffer_mut(&mut self) -> Option<&mut BytesMut> {
        (self.state == FrameState::Accumulating).then_some(&mut self.buffer)
    }

    /// Append a chunk. Ignored once the frame is completed or aborted.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        match self.buffer_mut() {
            Some(buffer) => {
                buffer.extend_from_slice(chunk);
                true
            }
            None => false,
        }
    }

    /// The peer closed the connection.
    ///
    /// Returns `Ok(None)` for a blank frame, which is not an error: the peer
    /// simply had nothing to say. Bytes that are not UTF-8 abort the frame.
    pub fn close(&mut self) -> Result<Option<Document>, FrameError> {
        if self.state != FrameState::Accumulating {
            return Err(FrameError::Finished(self.state));
        }

        let bytes = std::mem::take(&mut self.buffer).freeze();
        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text,
            Err(err) => {
                self.state = FrameState::Aborted;
                return Err(FrameError::Undecodable(err));
            }
        };

        self.state = FrameState::Completed;
        if is_blank(text) {
            return Ok(None);
        }
        Ok(Document::parse(text).ok())
    }

    /// A transport error ended the connection; the partial frame is dropped.
    pub fn abort(&mut self) {
        if self.state == FrameState::Accumulating {
            self.buffer = BytesMut::new();
            self.state = FrameState::Aborted;
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
