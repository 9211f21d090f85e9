//! # File sink: append encoded events to a local file.
//!
//! The default destination when the descriptor has no scheme. Writes are
//! line-buffered: every `send` flushes, so a crashed run leaves at most
//! the event being written incomplete.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::encode::{Attributes, Encoding};
use crate::error::SinkError;
use crate::sinks::{Namespace, Sink};

/// Writes workflow event logs to a file.
pub struct FileSink {
    writer: BufWriter<tokio::fs::File>,
    path: PathBuf,
    namespace: Namespace,
    encoding: Encoding,
}

impl FileSink {
    /// Opens `path` for appending, or truncates it when `restart` is set
    /// (only when the caller explicitly requests a fresh run).
    pub async fn create(
        path: impl AsRef<Path>,
        restart: bool,
        namespace: Namespace,
        encoding: Encoding,
    ) -> Result<FileSink, SinkError> {
        let path = path.as_ref().to_path_buf();
        let mut opts = OpenOptions::new();
        opts.create(true).write(true);
        if restart {
            opts.truncate(true);
        } else {
            opts.append(true);
        }
        let file = opts.open(&path).await.map_err(|e| SinkError::Io {
            target: path.display().to_string(),
            source: e,
        })?;

        Ok(FileSink {
            writer: BufWriter::new(file),
            path,
            namespace,
            encoding,
        })
    }

    fn io_err(&self, e: std::io::Error) -> SinkError {
        SinkError::Io {
            target: self.path.display().to_string(),
            source: e,
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&mut self, event: &str, attrs: &Attributes) -> Result<(), SinkError> {
        let bytes = self.encoding.encode(self.namespace, event, attrs)?;
        self.writer
            .write_all(&bytes)
            .await
            .map_err(|e| self.io_err(e))?;
        if self.encoding.line_oriented() {
            self.writer
                .write_all(b"\n")
                .await
                .map_err(|e| self.io_err(e))?;
        }
        // Line-buffered: make each record durable against caller crashes.
        self.writer.flush().await.map_err(|e| self.io_err(e))
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await.map_err(|e| self.io_err(e))
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.writer.shutdown().await.map_err(|e| self.io_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs_of(i: u64) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("seq".to_string(), json!(i));
        attrs
    }

    #[tokio::test]
    async fn test_appends_records_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let mut sink = FileSink::create(&path, false, Namespace::Stampede, Encoding::Json)
            .await
            .unwrap();
        for i in 0..5 {
            sink.send("xwf.end", &attrs_of(i)).await.unwrap();
        }
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            let doc: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(doc["event"], json!("stampede.xwf.end"));
            assert_eq!(doc["seq"], json!(i as u64));
        }
    }

    #[tokio::test]
    async fn test_append_mode_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "{\"event\":\"stampede.old\"}\n").unwrap();

        let mut sink = FileSink::create(&path, false, Namespace::Stampede, Encoding::Json)
            .await
            .unwrap();
        sink.send("wf.plan", &Attributes::new()).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("{\"event\":\"stampede.old\"}"));
    }

    #[tokio::test]
    async fn test_restart_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = FileSink::create(&path, true, Namespace::Stampede, Encoding::Json)
            .await
            .unwrap();
        sink.send("wf.plan", &Attributes::new()).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_bp_records_have_no_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.bp");

        let mut sink = FileSink::create(&path, false, Namespace::Stampede, Encoding::Bp)
            .await
            .unwrap();
        sink.send("wf.plan", &Attributes::new()).await.unwrap();
        sink.send("inv.end", &Attributes::new()).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "stampede.wf.planstampede.inv.end");
    }
}
