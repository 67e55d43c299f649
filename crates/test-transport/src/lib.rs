//! A scripted turn transport for testing purpose.
//!
//! The transport plays back preset turns as raw SSE byte chunks and
//! records every outbound request, so tests can drive the whole turn
//! loop without a server. Chunk boundaries are whatever the script says
//! they are, which makes split-boundary cases easy to exercise.
//!
//! # Note
//!
//! This type is not optimized for production use, there are heavy memory
//! copies involved. You should only use it for testing.

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use chatloop_protocol::{
    ErrorKind, TransportError, TurnRequest, TurnStream, TurnTransport,
};
use pin_project_lite::pin_project;
use serde_json::{Value, json};
use tokio::time::{Sleep, sleep};

/// Error type for the scripted transport.
#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Error {
    fn new(message: &'static str, kind: ErrorKind) -> Self {
        Self { message, kind }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl TransportError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Formats one event frame as raw SSE bytes.
pub fn event_frame(event: &str, data: Value) -> Bytes {
    let payload = json!({ "event": event, "data": data });
    Bytes::from(format!("data: {payload}\n\n"))
}

/// The terminal sentinel frame.
pub fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

pin_project! {
    /// A scripted chunk stream.
    #[derive(Debug)]
    pub struct ByteStream {
        chunks: VecDeque<Bytes>,
        fail_mid_stream: bool,
        delay: Option<Duration>,
        #[pin]
        sleep: Option<Sleep>,
    }
}

impl ByteStream {
    /// Creates a stream that yields the given chunks in order.
    pub fn new<C: Into<VecDeque<Bytes>>>(chunks: C) -> Self {
        Self {
            chunks: chunks.into(),
            fail_mid_stream: false,
            delay: None,
            sleep: None,
        }
    }

    /// Makes the stream fail once its chunks are exhausted, instead of
    /// completing.
    pub fn fail_mid_stream(mut self) -> Self {
        self.fail_mid_stream = true;
        self
    }

    /// Applies a delay before each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl TurnStream for ByteStream {
    type Error = Error;

    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>> {
        let mut this = self.project();
        if let Some(delay) = *this.delay {
            if this.sleep.as_mut().as_pin_mut().is_none() {
                this.sleep.set(Some(sleep(delay)));
            }
            if let Some(sleep) = this.sleep.as_mut().as_pin_mut() {
                ready!(sleep.poll(cx));
            }
            this.sleep.set(None);
        }
        match this.chunks.pop_front() {
            Some(chunk) => Poll::Ready(Ok(Some(chunk))),
            None => {
                if *this.fail_mid_stream {
                    Poll::Ready(Err(Error::new(
                        "injected mid-stream failure",
                        ErrorKind::Network,
                    )))
                } else {
                    Poll::Ready(Ok(None))
                }
            }
        }
    }
}

enum ScriptedTurn {
    Stream(Vec<Bytes>),
    OpenFailure,
}

#[derive(Default)]
struct Shared {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
    delay: Mutex<Option<Duration>>,
}

/// A turn transport that plays back a script.
///
/// Push one scripted turn per request you expect the driver to send;
/// turns are consumed in order, and a request beyond the script fails at
/// open. Clones share the script and the request log.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scripted turn that streams the given chunks.
    pub fn push_turn<C: Into<Vec<Bytes>>>(&self, chunks: C) {
        self.shared
            .turns
            .lock()
            .unwrap()
            .push_back(ScriptedTurn::Stream(chunks.into()));
    }

    /// Adds a scripted turn that fails at stream open.
    pub fn push_open_failure(&self) {
        self.shared
            .turns
            .lock()
            .unwrap()
            .push_back(ScriptedTurn::OpenFailure);
    }

    /// Applies a delay before every chunk of subsequent turns.
    pub fn set_delay(&self, delay: Duration) {
        *self.shared.delay.lock().unwrap() = Some(delay);
    }

    /// Returns the requests recorded so far.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.shared.requests.lock().unwrap().clone()
    }
}

impl TurnTransport for ScriptedTransport {
    type Error = Error;
    type Stream = ByteStream;

    fn send_turn(
        &self,
        req: &TurnRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let shared = Arc::clone(&self.shared);
        shared.requests.lock().unwrap().push(req.clone());

        let turn = shared.turns.lock().unwrap().pop_front();
        let result = match turn {
            Some(ScriptedTurn::Stream(chunks)) => {
                let mut stream = ByteStream::new(chunks);
                if let Some(delay) = *shared.delay.lock().unwrap() {
                    stream = stream.with_delay(delay);
                }
                Ok(stream)
            }
            Some(ScriptedTurn::OpenFailure) => {
                Err(Error::new("scripted open failure", ErrorKind::Status))
            }
            None => Err(Error::new("no more scripted turns", ErrorKind::Other)),
        };
        ready(result)
    }
}
