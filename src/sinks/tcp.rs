//! # TCP sink: stream encoded events over one persistent socket.
//!
//! The socket is opened once at construction; a failed connect
//! propagates to the caller (no retry). Events are written as raw bytes
//! with no framing or length prefix — the peer owns record separation.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::encode::{Attributes, Encoding};
use crate::error::SinkError;
use crate::sinks::{Namespace, Sink};

/// Writes workflow event logs to a `host:port` peer.
#[derive(Debug)]
pub struct TcpSink {
    stream: TcpStream,
    peer: String,
    namespace: Namespace,
    encoding: Encoding,
}

impl TcpSink {
    /// Connects to `host:port`. Connect failures are not retried.
    pub async fn connect(
        host: &str,
        port: u16,
        namespace: Namespace,
        encoding: Encoding,
    ) -> Result<TcpSink, SinkError> {
        let peer = format!("{host}:{port}");
        let stream = TcpStream::connect(&peer).await.map_err(|e| SinkError::Io {
            target: peer.clone(),
            source: e,
        })?;
        tracing::debug!(peer = %peer, "tcp event sink connected");

        Ok(TcpSink {
            stream,
            peer,
            namespace,
            encoding,
        })
    }

    fn io_err(&self, e: std::io::Error) -> SinkError {
        SinkError::Io {
            target: self.peer.clone(),
            source: e,
        }
    }
}

#[async_trait]
impl Sink for TcpSink {
    async fn send(&mut self, event: &str, attrs: &Attributes) -> Result<(), SinkError> {
        let bytes = self.encoding.encode(self.namespace, event, attrs)?;
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|e| self.io_err(e))
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.stream.shutdown().await.map_err(|e| self.io_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        // Bind-then-drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TcpSink::connect("127.0.0.1", port, Namespace::Stampede, Encoding::Bp)
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "io_error");
    }

    #[tokio::test]
    async fn test_sends_raw_bytes_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            sock.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut sink = TcpSink::connect("127.0.0.1", port, Namespace::Stampede, Encoding::Bp)
            .await
            .unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("status".to_string(), json!(0));
        sink.send("xwf.start", &Attributes::new()).await.unwrap();
        sink.send("xwf.end", &attrs).await.unwrap();
        sink.close().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            String::from_utf8(received).unwrap(),
            "stampede.xwf.startstampede.xwf.end status=0"
        );
    }
}
