use std::io;

/// A protocol-level outcome reported *by the server* for a command: not a transport failure, just
/// the server declining the request. Stored on the response, never surfaced as an `Err`, see
/// §4.1.1: these three kinds never poison the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    /// Bare `ERROR\r\n`: the command itself was not recognized.
    #[error("ERROR")]
    Generic,
    /// `CLIENT_ERROR <text>\r\n`: the request was malformed.
    #[error("CLIENT_ERROR {0}")]
    Client(String),
    /// `SERVER_ERROR <text>\r\n`: the server failed to service an otherwise well-formed request.
    #[error("SERVER_ERROR {0}")]
    Server(String),
}

/// Framing/parse failure while reading a response line or payload.
///
/// Unlike [`ServerError`], a `ProtoError` means the byte stream could not be trusted to still be
/// in sync with the protocol: callers never see this type directly, it is mapped to an
/// [`io::Error`] at the [`Message`](mc_core::Message) boundary so that `mc-core` poisons the
/// connection the same way it would for any other transport error.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed response: {0}")]
    BadResponse(String),
}

impl ProtoError {
    pub(crate) fn bad(msg: impl Into<String>) -> Self {
        ProtoError::BadResponse(msg.into())
    }
}

/// Maps a [`ProtoError`] onto the [`io::Error`] that `Message::read_response` must return.
pub(crate) fn proto_to_io(err: ProtoError) -> io::Error {
    match err {
        ProtoError::Io(err) => err,
        ProtoError::BadResponse(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
    }
}
