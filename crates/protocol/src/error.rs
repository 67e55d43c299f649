/// The kind of transport error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server responded with a non-success status.
    Status,
    /// The connection failed, or the stream was interrupted.
    Network,
    /// Any other errors.
    Other,
}
