use std::error::Error;
use std::pin::Pin;
use std::task::{self, Poll};

use bytes::Bytes;

use crate::error::ErrorKind;
use crate::request::TurnRequest;

/// The error type for a turn transport.
pub trait TransportError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// The raw byte stream carrying one turn's server-sent events.
///
/// The stream yields UTF-8 text in chunks whose boundaries carry no
/// meaning; a single event frame may span several chunks and a single
/// chunk may carry several frames.
pub trait TurnStream: Send + 'static {
    /// The error type that may be returned by the transport.
    type Error: TransportError;

    /// Attempts to pull out the next chunk from the stream.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct stream state:
    ///
    /// - `Poll::Pending` means that this stream is still waiting for the
    ///   next chunk. Implementations will ensure that the current task
    ///   will be notified when the next chunk may be ready.
    /// - `Poll::Ready(Ok(Some(chunk)))` means the stream has a chunk to
    ///   deliver, and may produce further chunks on subsequent
    ///   `poll_next_chunk` calls.
    /// - `Poll::Ready(Ok(None))` means the stream has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while reading
    ///   the stream.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>>;
}

/// A type that executes turns against the upstream turn service.
///
/// Once the transport is created, it should behave like a stateless
/// object. It can still have internal state, but callers should not rely
/// on it, and the transport should be prepared for being dropped anytime.
pub trait TurnTransport: Send + Sync {
    /// The error type that may be returned by the transport.
    type Error: TransportError;

    /// The stream type this transport produces.
    type Stream: TurnStream<Error = Self::Error>;

    /// Sends a turn request and opens the response stream.
    fn send_turn(
        &self,
        req: &TurnRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
