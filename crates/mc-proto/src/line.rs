use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};

use crate::error::ProtoError;

/// Reads one CRLF-terminated header line, returning it with the `\r\n` stripped.
///
/// Per §4.1.5, the wire format never sends a bare `\n`: a line not ending in `\r\n` (including a
/// line ending at EOF) is a framing error, not a line to tolerate.
pub(crate) async fn read_line(reader: &mut (dyn AsyncBufRead + Send + Unpin)) -> Result<String, ProtoError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;

    if n == 0 {
        return Err(ProtoError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed while reading a response line",
        )));
    }

    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ProtoError::bad(format!(
            "response line not CRLF-terminated: {:?}",
            String::from_utf8_lossy(&buf)
        )));
    }
    buf.truncate(buf.len() - 2);

    String::from_utf8(buf).map_err(|err| ProtoError::bad(format!("response line is not valid UTF-8: {err}")))
}

/// Parses a single whitespace-separated token out of an iterator produced by `line.split(' ')`,
/// mapping the "ran out of tokens" case to a uniform [`ProtoError`].
pub(crate) fn next_token<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<&'a str, ProtoError> {
    tokens
        .next()
        .filter(|tok| !tok.is_empty())
        .ok_or_else(|| ProtoError::bad(format!("response missing {what}")))
}

pub(crate) fn parse_u16(tok: &str, what: &str) -> Result<u16, ProtoError> {
    tok.parse()
        .map_err(|_| ProtoError::bad(format!("invalid {what}: {tok:?}")))
}

pub(crate) fn parse_usize(tok: &str, what: &str) -> Result<usize, ProtoError> {
    tok.parse()
        .map_err(|_| ProtoError::bad(format!("invalid {what}: {tok:?}")))
}
