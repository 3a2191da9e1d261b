use std::io;
use std::sync::OnceLock;

use async_trait::async_trait;
use mc_core::Message;
use tokio::io::{AsyncBufRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

use crate::error::{proto_to_io, ProtoError, ServerError};
use crate::line::{next_token, parse_u16, parse_usize, read_line};

/// Outcome of a completed `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    /// `END` with no preceding `VALUE` line.
    Miss,
    /// A `VALUE` block for the requested key.
    Value { flags: u16, payload: Vec<u8> },
    /// The server rejected the command outright rather than answering it.
    Error(ServerError),
}

/// A `get <key>` request/response pair, pipelined over a [`Connection`](mc_core::Connection).
pub struct GetMessage {
    key: String,
    outcome: OnceLock<GetOutcome>,
}

impl GetMessage {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            outcome: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The parsed outcome, once the framework has completed this message. `None` before that.
    pub fn outcome(&self) -> Option<&GetOutcome> {
        self.outcome.get()
    }
}

#[async_trait]
impl Message for GetMessage {
    async fn write_request(&self, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> io::Result<()> {
        writer.write_all(b"get ").await?;
        writer.write_all(self.key.as_bytes()).await?;
        writer.write_all(b"\r\n").await
    }

    async fn read_response(&self, reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> io::Result<()> {
        let outcome = parse_get_response(reader, &self.key).await.map_err(proto_to_io)?;
        // `read_response` runs at most once per message, so this can only fail if the message was
        // reused across two calls, which the framework never does.
        let _ = self.outcome.set(outcome);
        Ok(())
    }
}

async fn parse_get_response(
    reader: &mut (dyn AsyncBufRead + Send + Unpin),
    key: &str,
) -> Result<GetOutcome, ProtoError> {
    let line = read_line(reader).await?;

    if line == "END" {
        return Ok(GetOutcome::Miss);
    }
    if line == "ERROR" {
        return Ok(GetOutcome::Error(ServerError::Generic));
    }
    if let Some(text) = line.strip_prefix("CLIENT_ERROR ") {
        return Ok(GetOutcome::Error(ServerError::Client(text.to_owned())));
    }
    if let Some(text) = line.strip_prefix("SERVER_ERROR ") {
        return Ok(GetOutcome::Error(ServerError::Server(text.to_owned())));
    }

    let Some(rest) = line.strip_prefix("VALUE ") else {
        return Err(ProtoError::bad(format!("unexpected response line: {line:?}")));
    };

    let mut tokens = rest.split(' ');
    let resp_key = next_token(&mut tokens, "key")?;
    if resp_key != key {
        return Err(ProtoError::bad(format!(
            "response key {resp_key:?} does not match requested key {key:?}"
        )));
    }
    let flags = parse_u16(next_token(&mut tokens, "flags")?, "flags")?;
    let length = parse_usize(next_token(&mut tokens, "length")?, "length")?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(ProtoError::Io)?;

    let terminator = read_line(reader).await?;
    if !terminator.is_empty() {
        return Err(ProtoError::bad(format!(
            "expected CRLF after value payload, got {terminator:?}"
        )));
    }
    let end_line = read_line(reader).await?;
    if end_line != "END" {
        return Err(ProtoError::bad(format!(
            "expected END after value block, got {end_line:?}"
        )));
    }

    Ok(GetOutcome::Value { flags, payload })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    async fn parse(bytes: &[u8], key: &str) -> Result<GetOutcome, ProtoError> {
        let mut reader = Cursor::new(bytes.to_vec());
        parse_get_response(&mut reader, key).await
    }

    #[tokio::test]
    async fn miss() {
        assert_eq!(parse(b"END\r\n", "k").await.unwrap(), GetOutcome::Miss);
    }

    #[tokio::test]
    async fn hit() {
        let outcome = parse(b"VALUE k 7 3\r\nabc\r\nEND\r\n", "k").await.unwrap();
        assert_eq!(
            outcome,
            GetOutcome::Value {
                flags: 7,
                payload: b"abc".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn key_mismatch_is_bad_response() {
        let err = parse(b"VALUE other 0 1\r\nx\r\nEND\r\n", "k").await.unwrap_err();
        assert!(matches!(err, ProtoError::BadResponse(_)));
    }

    #[tokio::test]
    async fn server_errors_are_not_bad_response() {
        assert_eq!(
            parse(b"CLIENT_ERROR bad command line format\r\n", "k").await.unwrap(),
            GetOutcome::Error(ServerError::Client("bad command line format".to_owned()))
        );
    }

    #[tokio::test]
    async fn missing_crlf_is_bad_response() {
        let err = parse(b"END\n", "k").await.unwrap_err();
        assert!(matches!(err, ProtoError::BadResponse(_)));
    }
}
