//! # Database sink: forward event records to an external loader.
//!
//! The relational schema and batch-loading discipline live outside this
//! crate, behind the [`RecordLoader`] contract (`process`/`flush`/
//! `finish`). The sink's whole job is shaping the record: the namespaced
//! event name plus every attribute with `__` compound keys restored to
//! their dotted form.
//!
//! Loaders are chosen by namespace through a caller-supplied
//! [`LoaderProvider`]: workflow events go to the workflow loader,
//! dashboard events to the dashboard loader.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::encode::Attributes;
use crate::error::SinkError;
use crate::props::Properties;
use crate::sinks::{Namespace, Sink};

/// One flat record handed to the loader: `event` plus dotted attribute keys.
pub type Record = Map<String, Value>;

/// External batch loader contract.
///
/// The loader performs its own batching and transaction discipline;
/// this crate only guarantees call order: any number of `process`, then
/// `finish` exactly once at close.
#[async_trait]
pub trait RecordLoader: Send {
    /// Consumes one event record.
    async fn process(&mut self, record: Record) -> Result<(), SinkError>;

    /// Pushes buffered records toward the database.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Completes the load; called once, at sink close.
    async fn finish(&mut self) -> Result<(), SinkError>;
}

/// Builds record loaders for database destinations.
///
/// `dest` is the full destination string (the scheme doubles as the
/// dialect hint); `props` are the connection properties scoped for this
/// sink.
#[async_trait]
pub trait LoaderProvider: Send + Sync {
    /// Loader for workflow (`stampede.`) events.
    async fn workflow(
        &self,
        dest: &str,
        props: &Properties,
    ) -> Result<Box<dyn RecordLoader>, SinkError>;

    /// Loader for dashboard (`dashboard.`) events.
    async fn dashboard(
        &self,
        dest: &str,
        props: &Properties,
    ) -> Result<Box<dyn RecordLoader>, SinkError>;
}

/// Writes workflow event logs to a database via an external loader.
pub struct DbSink {
    loader: Box<dyn RecordLoader>,
    namespace: Namespace,
}

impl DbSink {
    /// Wraps an already-constructed loader.
    pub fn new(loader: Box<dyn RecordLoader>, namespace: Namespace) -> DbSink {
        DbSink { loader, namespace }
    }
}

#[async_trait]
impl Sink for DbSink {
    async fn send(&mut self, event: &str, attrs: &Attributes) -> Result<(), SinkError> {
        tracing::trace!(event, "db send start");
        let mut record = Record::with_capacity(attrs.len() + 1);
        record.insert(
            "event".to_string(),
            Value::String(self.namespace.qualify(event)),
        );
        for (k, v) in attrs {
            // Compound keys come in double-underscore-joined; the schema
            // side wants them dotted.
            record.insert(k.replace("__", "."), v.clone());
        }
        self.loader.process(record).await?;
        tracing::trace!(event, "db send end");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.loader.flush().await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.loader.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Captured {
        records: Vec<Record>,
        flushed: usize,
        finished: bool,
    }

    struct CapturingLoader(Arc<Mutex<Captured>>);

    #[async_trait]
    impl RecordLoader for CapturingLoader {
        async fn process(&mut self, record: Record) -> Result<(), SinkError> {
            self.0.lock().unwrap().records.push(record);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), SinkError> {
            self.0.lock().unwrap().flushed += 1;
            Ok(())
        }

        async fn finish(&mut self) -> Result<(), SinkError> {
            self.0.lock().unwrap().finished = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_record_shape_and_lifecycle() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let mut sink = DbSink::new(
            Box::new(CapturingLoader(Arc::clone(&captured))),
            Namespace::Stampede,
        );

        let mut attrs = Attributes::new();
        attrs.insert("host__info".to_string(), json!("node1"));
        attrs.insert("status".to_string(), json!(0));
        sink.send("job_inst.main.end", &attrs).await.unwrap();
        sink.flush().await.unwrap();
        sink.close().await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.records.len(), 1);
        let record = &captured.records[0];
        assert_eq!(record["event"], json!("stampede.job_inst.main.end"));
        // "__" restored to "." for the schema side.
        assert_eq!(record["host.info"], json!("node1"));
        assert_eq!(record["status"], json!(0));
        assert!(record.get("host__info").is_none());
        assert_eq!(captured.flushed, 1);
        assert!(captured.finished);
    }

    #[tokio::test]
    async fn test_dashboard_namespace_in_record() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let mut sink = DbSink::new(
            Box::new(CapturingLoader(Arc::clone(&captured))),
            Namespace::Dashboard,
        );
        sink.send("xwf.start", &Attributes::new()).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.records[0]["event"], json!("dashboard.xwf.start"));
    }
}
