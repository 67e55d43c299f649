//! Reading `data: `-framed payloads from a turn stream.

use std::future::poll_fn;
use std::pin::Pin;

use chatloop_protocol::TurnStream;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug)]
pub(crate) enum FrameError<E> {
    /// The underlying stream failed mid-turn.
    Transport(E),
    /// The stream carried bytes that are not valid UTF-8.
    InvalidUtf8,
}

/// A type for reading event frames from a chunk stream.
///
/// Frames may be split across arbitrary chunk boundaries; the framer
/// buffers until the blank-line terminator arrives. Segments without the
/// `data: ` prefix are skipped. A payload equal to `[DONE]` terminates
/// the sequence without being emitted, as does stream closure; a
/// well-prefixed, non-sentinel remainder left in the buffer at closure
/// is emitted as a final frame.
pub(crate) struct Framer<S> {
    buf: String,
    stream: Pin<Box<S>>,
    done: bool,
}

impl<S: TurnStream> Framer<S> {
    #[inline]
    pub(crate) fn new(stream: S) -> Self {
        Self {
            buf: String::new(),
            stream: Box::pin(stream),
            done: false,
        }
    }

    /// Returns the next frame payload, or `None` once the sequence has
    /// terminated.
    ///
    /// The sequence is finite and not restartable: after the first
    /// `None`, every further call returns `None`.
    pub(crate) async fn next_frame(
        &mut self,
    ) -> Result<Option<String>, FrameError<S::Error>> {
        if self.done {
            return Ok(None);
        }
        loop {
            // Deliver a frame already sitting in the buffer first.
            if let Some(payload) = self.take_frame() {
                if payload == DONE_SENTINEL {
                    self.done = true;
                    return Ok(None);
                }
                return Ok(Some(payload));
            }

            let chunk =
                poll_fn(|cx| self.stream.as_mut().poll_next_chunk(cx))
                    .await
                    .map_err(FrameError::Transport)?;
            let Some(bytes) = chunk else {
                self.done = true;
                // Flush a trailing well-prefixed frame left in the
                // buffer by a stream that closed without a terminator.
                if let Some(payload) = self.buf.strip_prefix(DATA_PREFIX) {
                    if payload != DONE_SENTINEL {
                        let payload = payload.to_owned();
                        self.buf.clear();
                        return Ok(Some(payload));
                    }
                }
                return Ok(None);
            };
            let Ok(text) = str::from_utf8(&bytes) else {
                return Err(FrameError::InvalidUtf8);
            };
            self.buf.push_str(text);
        }
    }

    /// Splits one complete frame off the front of the buffer, skipping
    /// segments that don't carry a `data` field.
    fn take_frame(&mut self) -> Option<String> {
        loop {
            let eol_idx = self.buf.find("\n\n")?;
            let payload = self.buf[..eol_idx]
                .strip_prefix(DATA_PREFIX)
                .map(str::to_owned);
            self.buf.drain(..eol_idx + 2);
            if let Some(payload) = payload {
                return Some(payload);
            }
        }
    }
}
