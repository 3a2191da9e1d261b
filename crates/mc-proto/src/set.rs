use std::io;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use mc_core::Message;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt as _};

use crate::error::{proto_to_io, ProtoError, ServerError};
use crate::exptime::encode_exptime;
use crate::line::read_line;

/// Outcome of a completed `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Stored,
    Error(ServerError),
}

/// A `set <key> <flags> <exptime> <length>` request/response pair.
pub struct SetMessage {
    key: String,
    flags: u16,
    exptime: u32,
    payload: Vec<u8>,
    outcome: OnceLock<SetOutcome>,
}

impl SetMessage {
    /// `ttl: None` or `Some(Duration::ZERO)` both mean "no expiration"; see [`encode_exptime`].
    pub fn new(key: impl Into<String>, flags: u16, ttl: Option<Duration>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            flags,
            exptime: encode_exptime(ttl),
            payload,
            outcome: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn outcome(&self) -> Option<&SetOutcome> {
        self.outcome.get()
    }
}

#[async_trait]
impl Message for SetMessage {
    async fn write_request(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()> {
        let header = format!(
            "set {} {} {} {}\r\n",
            self.key,
            self.flags,
            self.exptime,
            self.payload.len()
        );
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(&self.payload).await?;
        writer.write_all(b"\r\n").await
    }

    async fn read_response(&self, reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> io::Result<()> {
        let outcome = parse_set_response(reader).await.map_err(proto_to_io)?;
        let _ = self.outcome.set(outcome);
        Ok(())
    }
}

async fn parse_set_response(reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> Result<SetOutcome, ProtoError> {
    let line = read_line(reader).await?;

    if line == "STORED" {
        return Ok(SetOutcome::Stored);
    }
    if line == "ERROR" {
        return Ok(SetOutcome::Error(ServerError::Generic));
    }
    if let Some(text) = line.strip_prefix("CLIENT_ERROR ") {
        return Ok(SetOutcome::Error(ServerError::Client(text.to_owned())));
    }
    if let Some(text) = line.strip_prefix("SERVER_ERROR ") {
        return Ok(SetOutcome::Error(ServerError::Server(text.to_owned())));
    }

    Err(ProtoError::bad(format!("unexpected response line: {line:?}")))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    async fn parse(bytes: &[u8]) -> Result<SetOutcome, ProtoError> {
        let mut reader = Cursor::new(bytes.to_vec());
        parse_set_response(&mut reader).await
    }

    #[tokio::test]
    async fn stored() {
        assert_eq!(parse(b"STORED\r\n").await.unwrap(), SetOutcome::Stored);
    }

    #[tokio::test]
    async fn server_error() {
        assert_eq!(
            parse(b"SERVER_ERROR out of memory\r\n").await.unwrap(),
            SetOutcome::Error(ServerError::Server("out of memory".to_owned()))
        );
    }

    #[tokio::test]
    async fn garbage_is_bad_response() {
        assert!(matches!(parse(b"WAT\r\n").await.unwrap_err(), ProtoError::BadResponse(_)));
    }

    #[test]
    fn request_header_uses_encoded_exptime() {
        let msg = SetMessage::new("k", 9, Some(Duration::from_secs(60)), b"abc".to_vec());
        assert_eq!(msg.exptime, 60);
    }
}
