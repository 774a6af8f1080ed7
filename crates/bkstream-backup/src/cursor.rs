//! One-frame lookahead over a frame source
//!
//! Both readers keep the next frame (or the error that replaced it) buffered
//! so `has_next` can answer without touching the source.

use std::io::{self, Read};

use bkstream_core::{BackupError, BackupResult, TruncationPolicy};
use bkstream_frames::read_frame;
use tracing::warn;

enum Lookahead {
    Frame(Vec<u8>),
    Failed(BackupError),
    Exhausted,
}

pub(crate) struct FrameCursor<R: Read> {
    source: Option<R>,
    next: Lookahead,
    truncation: TruncationPolicy,
    frames_read: u64,
}

/// Input that stopped inside a length prefix or payload.
fn is_truncation(err: &BackupError) -> bool {
    match err {
        BackupError::Truncated { .. } => true,
        BackupError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

impl<R: Read> FrameCursor<R> {
    /// Nothing is buffered until the first [`advance`](Self::advance).
    pub(crate) fn new(source: R, truncation: TruncationPolicy) -> Self {
        Self {
            source: Some(source),
            next: Lookahead::Exhausted,
            truncation,
            frames_read: 0,
        }
    }

    /// Run `read` against the source, applying the truncation policy to
    /// its result. A closed cursor reads as end of stream.
    pub(crate) fn read_with<T>(
        &mut self,
        read: impl FnOnce(&mut R) -> BackupResult<Option<T>>,
    ) -> BackupResult<Option<T>> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        match read(source) {
            Err(e) if is_truncation(&e) && self.truncation == TruncationPolicy::EndOfStream => {
                warn!(
                    error = %e,
                    frames_read = self.frames_read,
                    "stream ended inside a frame, treating as end of stream"
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// Buffer the next frame, replacing whatever was buffered.
    pub(crate) fn advance(&mut self) {
        self.next = match self.read_with(|r| read_frame(r)) {
            Ok(Some(frame)) => Lookahead::Frame(frame),
            Ok(None) => Lookahead::Exhausted,
            Err(e) => Lookahead::Failed(e),
        };
    }

    /// True while a frame or an undelivered error is buffered.
    pub(crate) fn has_next(&self) -> bool {
        !self.is_exhausted()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        matches!(self.next, Lookahead::Exhausted)
    }

    /// Hand out the buffered frame and read ahead one more. A buffered error
    /// is returned once; after that the cursor is exhausted.
    pub(crate) fn next_frame(&mut self) -> BackupResult<Vec<u8>> {
        match std::mem::replace(&mut self.next, Lookahead::Exhausted) {
            Lookahead::Frame(frame) => {
                self.frames_read += 1;
                self.advance();
                Ok(frame)
            }
            Lookahead::Failed(e) => Err(e),
            Lookahead::Exhausted => Err(BackupError::NoSuchElement),
        }
    }

    /// Replace the lookahead with `err`.
    pub(crate) fn fail(&mut self, err: BackupError) {
        self.next = Lookahead::Failed(err);
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut R> {
        self.source.as_mut()
    }

    pub(crate) fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Drop the source and any buffered frame.
    pub(crate) fn close(&mut self) {
        self.source = None;
        self.next = Lookahead::Exhausted;
    }
}
