//! Receive buffer with a read cursor.
//!
//! Bytes are appended at the tail and consumed from the cursor. Nothing is
//! consumed until a complete unit (a line or a fixed-size body) is present,
//! so a decoder that gets `None` can simply retry after the next read.

use crate::{
    constants::BUF_CHUNK,
    error::{EslError, EslResult},
};

pub(crate) struct EslBuffer {
    data: Vec<u8>,
    position: usize,
    max_size: usize,
}

impl EslBuffer {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            data: Vec::with_capacity(BUF_CHUNK.min(max_size)),
            position: 0,
            max_size,
        }
    }

    /// Number of buffered, unconsumed bytes.
    pub(crate) fn len(&self) -> usize {
        self.data
            .len()
            - self.position
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data
            .extend_from_slice(bytes);
    }

    /// Fail if the unconsumed bytes exceed the configured cap.
    pub(crate) fn check_size_limits(&self) -> EslResult<()> {
        let length = self.len();
        if length > self.max_size {
            return Err(EslError::FrameTooLong {
                length,
                limit: self.max_size,
            });
        }
        Ok(())
    }

    /// Take one LF-terminated line, without the LF.
    ///
    /// Returns `Ok(None)` when no LF is buffered yet. A line (terminated or
    /// still growing) longer than `max_line` is `FrameTooLong`.
    pub(crate) fn take_line(&mut self, max_line: usize) -> EslResult<Option<Vec<u8>>> {
        let pending = &self.data[self.position..];
        match pending
            .iter()
            .position(|&b| b == b'\n')
        {
            Some(end) => {
                if end > max_line {
                    return Err(EslError::FrameTooLong {
                        length: end,
                        limit: max_line,
                    });
                }
                let line = pending[..end].to_vec();
                self.position += end + 1;
                self.compact();
                Ok(Some(line))
            }
            None if pending.len() > max_line => Err(EslError::FrameTooLong {
                length: pending.len(),
                limit: max_line,
            }),
            None => Ok(None),
        }
    }

    /// Take exactly `count` bytes, or nothing if fewer are buffered.
    pub(crate) fn take_bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.len() < count {
            return None;
        }
        let start = self.position;
        self.position += count;
        let bytes = self.data[start..self.position].to_vec();
        self.compact();
        Some(bytes)
    }

    /// Drop consumed bytes once they dominate the allocation.
    fn compact(&mut self) {
        if self.position == self
            .data
            .len()
        {
            self.data
                .clear();
            self.position = 0;
        } else if self.position >= BUF_CHUNK {
            self.data
                .drain(..self.position);
            self.position = 0;
        }
    }
}
