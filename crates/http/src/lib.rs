//! An HTTP transport for the turn-execution service.
//!
//! Posts the turn request as JSON and reads the reply as a server-sent
//! event stream. The service is typically a thin proxy in front of the
//! upstream model provider; this crate neither knows nor cares which.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod stream;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use chatloop_protocol::{
    ErrorKind, TransportError, TurnRequest, TurnTransport,
};
use mime::Mime;
use reqwest::{Client, Response, header};

pub use config::{HttpConfig, HttpConfigBuilder};
pub use stream::HttpTurnStream;

/// Error type for [`HttpTransport`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
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

/// HTTP turn transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    config: Arc<HttpConfig>,
}

impl HttpTransport {
    /// Creates a new `HttpTransport` with the given configuration.
    #[inline]
    pub fn new(config: HttpConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl TurnTransport for HttpTransport {
    type Error = Error;
    type Stream = HttpTurnStream;

    fn send_turn(
        &self,
        req: &TurnRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let mut builder = self
            .client
            .post(self.config.endpoint.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.config.token {
            builder = builder
                .header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let resp_fut = builder.json(req).send();

        async move {
            let resp = match resp_fut.await.and_then(Response::error_for_status)
            {
                Ok(resp) => resp,
                Err(err) => {
                    let kind = if err.is_status() {
                        ErrorKind::Status
                    } else {
                        ErrorKind::Network
                    };
                    return Err(Error::new(format!("{err}"), kind));
                }
            };

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.essence_str() == "text/event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            trace!("turn stream opened");
            Ok(HttpTurnStream::from_response(resp))
        }
    }
}
