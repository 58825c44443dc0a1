//! Incremental decoding of streamed generate responses.
//!
//! A streaming response body is a sequence of JSON objects of shape
//! `{"text": [...]}`, each terminated by a single NUL byte. Chunk boundaries
//! carry no meaning: one chunk may hold several frames, and one frame may
//! span many chunks.

use std::ops::Range;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use crate::cancellation::CancellationToken;
use crate::error::{Error, Result};
use crate::response::decode_frame;
use crate::types::GenerationFrame;

/// Byte terminating every frame.
pub const FRAME_DELIMITER: u8 = 0x00;

/// Initial capacity of a [`StreamBuffer`] in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * 1024;

/// Growable byte arena holding not-yet-decoded stream bytes.
///
/// `data[consumed..filled]` is pending input. Capacity doubles whenever an
/// append would not fit; growth preserves every pending byte.
#[derive(Debug)]
pub struct StreamBuffer {
    data: Vec<u8>,
    filled: usize,
    consumed: usize,
    // No delimiter exists in data[consumed..scanned].
    scanned: usize,
}

impl StreamBuffer {
    /// Creates a buffer with the given initial capacity (at least 1 byte).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            filled: 0,
            consumed: 0,
            scanned: 0,
        }
    }

    /// Current capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered bytes not yet consumed by a frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filled - self.consumed
    }

    /// Returns `true` if no unconsumed bytes remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == self.consumed
    }

    /// Returns `true` if the filled region reaches capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Unconsumed bytes.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.data[self.consumed..self.filled]
    }

    /// Appends `chunk` at the fill position, compacting and growing first
    /// as needed.
    pub fn append(&mut self, chunk: &[u8]) {
        self.compact();

        let needed = self.filled + chunk.len();
        if needed > self.data.len() {
            let mut capacity = self.data.len();
            while capacity < needed {
                capacity *= 2;
            }
            tracing::trace!(
                from = self.data.len(),
                to = capacity,
                buffered = self.filled,
                "Growing stream buffer"
            );
            self.data.resize(capacity, 0);
        }

        self.data[self.filled..needed].copy_from_slice(chunk);
        self.filled = needed;
    }

    /// Shifts the unconsumed remainder to the front of the buffer.
    pub fn compact(&mut self) {
        if self.consumed == 0 {
            return;
        }
        self.data.copy_within(self.consumed..self.filled, 0);
        self.filled -= self.consumed;
        self.scanned -= self.consumed;
        self.consumed = 0;
    }

    /// Finds the next delimiter and consumes everything up to and including
    /// it, returning the range of the frame body (delimiter excluded).
    fn take_frame(&mut self) -> Option<Range<usize>> {
        let start = self.scanned.max(self.consumed);
        match self.data[start..self.filled]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
        {
            Some(offset) => {
                let end = start + offset;
                let body = self.consumed..end;
                self.consumed = end + 1;
                self.scanned = self.consumed;
                Some(body)
            }
            None => {
                self.scanned = self.filled;
                None
            }
        }
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

/// Synchronous frame decoder: push bytes in, pull frames out.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: StreamBuffer,
    frames: usize,
}

impl FrameDecoder {
    /// Creates a decoder with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder whose buffer starts at `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: StreamBuffer::with_capacity(capacity),
            frames: 0,
        }
    }

    /// Feeds a chunk of the response body.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.append(chunk);
    }

    /// Decodes the next complete frame, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the delimited body is not a valid
    /// frame. The offending bytes are consumed.
    pub fn next_frame(&mut self) -> Result<Option<GenerationFrame>> {
        let Some(body) = self.buffer.take_frame() else {
            return Ok(None);
        };

        match decode_frame(&self.buffer.data[body.clone()]) {
            Ok(frame) => {
                self.frames += 1;
                tracing::trace!(
                    frame = self.frames,
                    bytes = body.len(),
                    completions = frame.len(),
                    "Decoded stream frame"
                );
                Ok(Some(frame))
            }
            Err(e) => {
                tracing::warn!(frame = self.frames + 1, error = %e, "Malformed stream frame");
                Err(e)
            }
        }
    }

    /// Checks that the input ended on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if undelimited bytes remain.
    pub fn finish(&self) -> Result<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                residual = self.buffer.len(),
                frames = self.frames,
                "Stream ended inside a frame"
            );
            Err(Error::protocol(format!(
                "truncated stream ({} undelimited bytes after {} frames)",
                self.buffer.len(),
                self.frames
            )))
        }
    }

    /// Number of frames decoded so far.
    #[must_use]
    pub fn frames_decoded(&self) -> usize {
        self.frames
    }

    /// Returns the underlying buffer.
    #[must_use]
    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }
}

struct DecodeState<S> {
    source: S,
    decoder: FrameDecoder,
    cancel: CancellationToken,
    done: bool,
}

impl<S, B> DecodeState<S>
where
    S: Stream<Item = Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    fn stop(&mut self) {
        self.done = true;
        // Release the arena now rather than when the stream is dropped.
        self.decoder = FrameDecoder::with_capacity(1);
    }

    async fn next_item(&mut self) -> Option<Result<GenerationFrame>> {
        if self.done {
            return None;
        }

        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(frames = self.decoder.frames_decoded(), "Stream cancelled");
                self.stop();
                return None;
            }

            match self.decoder.next_frame() {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => {}
                Err(e) => {
                    self.stop();
                    return Some(Err(e));
                }
            }

            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => continue,
                chunk = self.source.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => self.decoder.push(bytes.as_ref()),
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Stream source failed");
                    self.stop();
                    return Some(Err(e));
                }
                None => {
                    let finished = self.decoder.finish();
                    tracing::debug!(
                        frames = self.decoder.frames_decoded(),
                        truncated = finished.is_err(),
                        "Stream ended"
                    );
                    self.stop();
                    return finished.err().map(Err);
                }
            }
        }
    }
}

/// Decodes a chunked response body into a lazy sequence of frames.
///
/// Frames are yielded in delimiter order. The sequence ends after the first
/// error, when the source ends, or when `cancel` fires; cancellation ends it
/// without an error and without yielding further frames.
pub fn decode_stream<S, B>(source: S, cancel: CancellationToken, buffer_capacity: usize) -> FrameStream
where
    S: Stream<Item = Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        source,
        decoder: FrameDecoder::with_capacity(buffer_capacity),
        cancel,
        done: false,
    };

    FrameStream::new(futures::stream::unfold(state, |mut state| async move {
        let item = state.next_item().await?;
        Some((item, state))
    }))
}

/// A stream of decoded generation frames.
pub struct FrameStream {
    inner: Pin<Box<dyn Stream<Item = Result<GenerationFrame>> + Send>>,
}

impl FrameStream {
    /// Creates a new `FrameStream` from a stream of frames.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<GenerationFrame>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Creates an empty stream.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(futures::stream::empty())
    }

    /// Collects all frames into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first error the stream yields.
    pub async fn collect_frames(self) -> Result<Vec<GenerationFrame>> {
        let mut frames = Vec::new();
        let mut stream = self;
        while let Some(frame) = stream.next().await {
            frames.push(frame?);
        }
        Ok(frames)
    }

    /// Drains the stream and returns its final frame.
    ///
    /// # Errors
    ///
    /// Returns the first error the stream yields.
    pub async fn last_frame(self) -> Result<Option<GenerationFrame>> {
        let mut last = None;
        let mut stream = self;
        while let Some(frame) = stream.next().await {
            last = Some(frame?);
        }
        Ok(last)
    }
}

impl Stream for FrameStream {
    type Item = Result<GenerationFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream").finish_non_exhaustive()
    }
}
