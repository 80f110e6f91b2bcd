//! The LSP stdio transport: JSON-RPC messages framed as
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JSON>
//! ```

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tower_lsp::jsonrpc;

/// A message arriving over the transport: either a response to one of our
/// requests, or a peer-initiated request/notification.
#[derive(Debug)]
pub enum Incoming {
    Response(jsonrpc::Response),
    Request(jsonrpc::Request),
}

pub struct Reader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: BufReader::new(inner) }
    }

    /// Read the next complete message.
    ///
    /// Returns `Ok(None)` on a clean EOF at a message boundary. EOF inside a
    /// header block or body is an error.
    pub async fn read_message(&mut self) -> io::Result<Option<Incoming>> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.inner.read_line(&mut line).await?;
            if n == 0 {
                return match content_length {
                    None => Ok(None),
                    Some(_) => Err(io::ErrorKind::UnexpectedEof.into()),
                };
            }
            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }
            if let Some(value) = header.strip_prefix("Content-Length: ") {
                let length = value.trim().parse().map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("bad Content-Length: {e}"))
                })?;
                content_length = Some(length);
            }
            // Other headers (Content-Type) carry no information we need.
        }
        let length = content_length.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
        })?;

        let mut body = vec![0u8; length];
        self.inner.read_exact(&mut body).await?;

        let value: serde_json::Value = serde_json::from_slice(&body)?;
        let incoming = if value.get("method").is_some() {
            Incoming::Request(serde_json::from_value(value)?)
        } else {
            Incoming::Response(serde_json::from_value(value)?)
        };
        Ok(Some(incoming))
    }
}

pub struct Writer<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let body = serde_json::to_string(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(body.as_bytes()).await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower_lsp::jsonrpc::{Id, Request, Response};

    use super::*;

    #[tokio::test]
    async fn frames_a_request_and_reads_it_back() {
        let (a, b) = tokio::io::duplex(4096);
        let (_unused_read, write) = tokio::io::split(a);
        let (read, _unused_write) = tokio::io::split(b);
        let mut writer = Writer::new(write);
        let mut reader = Reader::new(read);

        let request = Request::build("initialize").id(1).params(json!({"rootUri": null})).finish();
        writer.write_message(&request).await.unwrap();

        match reader.read_message().await.unwrap().unwrap() {
            Incoming::Request(received) => {
                assert_eq!(received.method(), "initialize");
                assert_eq!(received.id(), Some(&Id::Number(1)));
            }
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn distinguishes_responses_from_notifications() {
        let (a, b) = tokio::io::duplex(4096);
        let (_unused_read, write) = tokio::io::split(a);
        let (read, _unused_write) = tokio::io::split(b);
        let mut writer = Writer::new(write);
        let mut reader = Reader::new(read);

        writer
            .write_message(&Response::from_ok(Id::Number(7), serde_json::Value::Null))
            .await
            .unwrap();
        writer
            .write_message(&Request::build("initialized").params(json!({})).finish())
            .await
            .unwrap();

        assert!(matches!(reader.read_message().await.unwrap(), Some(Incoming::Response(_))));
        match reader.read_message().await.unwrap().unwrap() {
            Incoming::Request(notification) => {
                assert_eq!(notification.method(), "initialized");
                assert_eq!(notification.id(), None);
            }
            other => panic!("expected a notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let (a, b) = tokio::io::duplex(4096);
        drop(a);
        let mut reader = Reader::new(b);
        assert!(reader.read_message().await.unwrap().is_none());
    }
}
