//! # Wire encodings for events.
//!
//! Three stateless encodings turn an event name plus attribute map into
//! bytes; the encoding is fixed per sink at construction:
//!
//! - **Bp** (default, `"bp"`): name-value tokens,
//!   `ns.event k1=v1 k2=v2 ...`, no trailing newline. Line-oriented
//!   transports add their own terminator.
//! - **Json** (`"json"`): one JSON object with `event` set to the
//!   namespaced name and every attribute key flattened (see below).
//! - **Bson** (`"bson"`): the same logical document in BSON, behind the
//!   optional `bson` cargo feature. Selecting it without the feature is a
//!   construction-time configuration error.
//!
//! ## JSON key flattening
//! Attribute keys go through **two** replacement passes: first every `.`
//! becomes `_`, then every `__` becomes `_`. The second pass can collapse
//! keys that were distinct at the source (`a.b` and `a__b` both become
//! `a_b`); downstream consumers already depend on this wire shape, so the
//! two-pass behavior is preserved as-is rather than deduplicated
//! differently. When two keys collapse, the later one wins.

use serde_json::{Map, Value};

use crate::error::SinkError;
use crate::sinks::Namespace;

/// Ordered event attribute map, as produced by the monitor.
///
/// Keys may contain dots or double-underscore compounds (`host__info`);
/// they are flat keys, never nested objects.
pub type Attributes = Map<String, Value>;

/// Wire encoding selected per sink at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Name-value tokens (`ns.event k=v ...`).
    Bp,
    /// One JSON document per event.
    Json,
    /// One BSON document per event (requires the `bson` feature).
    #[cfg(feature = "bson")]
    Bson,
}

impl Encoding {
    /// Resolves an encoding by name: `None` or `"bp"` → [`Encoding::Bp`],
    /// `"json"` → [`Encoding::Json`], `"bson"` → [`Encoding::Bson`].
    ///
    /// Unknown names and `"bson"` without the `bson` feature are
    /// configuration errors.
    pub fn from_name(name: Option<&str>) -> Result<Encoding, SinkError> {
        match name {
            None | Some("bp") => Ok(Encoding::Bp),
            Some("json") => Ok(Encoding::Json),
            #[cfg(feature = "bson")]
            Some("bson") => Ok(Encoding::Bson),
            #[cfg(not(feature = "bson"))]
            Some("bson") => Err(SinkError::EncodingUnavailable { name: "bson" }),
            Some(other) => Err(SinkError::UnknownEncoding {
                name: other.to_string(),
            }),
        }
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Bp => "bp",
            Encoding::Json => "json",
            #[cfg(feature = "bson")]
            Encoding::Bson => "bson",
        }
    }

    /// True for line-oriented encodings that want a `\n` terminator when
    /// written to line-oriented transports (files).
    pub fn line_oriented(&self) -> bool {
        matches!(self, Encoding::Json)
    }

    /// Encodes one event. Pure: no transport state, no buffering.
    pub fn encode(
        &self,
        namespace: Namespace,
        event: &str,
        attrs: &Attributes,
    ) -> Result<Vec<u8>, SinkError> {
        match self {
            Encoding::Bp => Ok(encode_bp(namespace, event, attrs)),
            Encoding::Json => {
                let doc = json_document(namespace, event, attrs);
                serde_json::to_vec(&doc).map_err(|e| SinkError::Encode {
                    event: event.to_string(),
                    reason: e.to_string(),
                })
            }
            #[cfg(feature = "bson")]
            Encoding::Bson => {
                let mut doc = Map::with_capacity(attrs.len() + 1);
                doc.insert(
                    "event".to_string(),
                    Value::String(namespace.qualify(event)),
                );
                for (k, v) in attrs {
                    doc.insert(k.clone(), v.clone());
                }
                bson::to_vec(&doc).map_err(|e| SinkError::Encode {
                    event: event.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Applies the two-pass JSON key flattening: `.` → `_`, then `__` → `_`.
pub(crate) fn flatten_key(key: &str) -> String {
    key.replace('.', "_").replace("__", "_")
}

fn encode_bp(namespace: Namespace, event: &str, attrs: &Attributes) -> Vec<u8> {
    let mut out = namespace.qualify(event);
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push('=');
        match v {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
    }
    out.into_bytes()
}

fn json_document(namespace: Namespace, event: &str, attrs: &Attributes) -> Value {
    let mut doc = Map::with_capacity(attrs.len() + 1);
    doc.insert(
        "event".to_string(),
        Value::String(namespace.qualify(event)),
    );
    for (k, v) in attrs {
        doc.insert(flatten_key(k), v.clone());
    }
    Value::Object(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_from_name_defaults_to_bp() {
        assert_eq!(Encoding::from_name(None).unwrap(), Encoding::Bp);
        assert_eq!(Encoding::from_name(Some("bp")).unwrap(), Encoding::Bp);
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        let err = Encoding::from_name(Some("xml")).unwrap_err();
        assert_eq!(err.as_label(), "unknown_encoding");
    }

    #[cfg(not(feature = "bson"))]
    #[test]
    fn test_bson_without_feature_is_config_error() {
        let err = Encoding::from_name(Some("bson")).unwrap_err();
        assert_eq!(err.as_label(), "encoding_unavailable");
    }

    #[test]
    fn test_bp_layout() {
        let a = attrs(&[
            ("wf__id", json!("wf-42")),
            ("status", json!(0)),
            ("site", json!("local")),
        ]);
        let bytes = Encoding::Bp
            .encode(Namespace::Stampede, "xwf.end", &a)
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "stampede.xwf.end wf__id=wf-42 status=0 site=local"
        );
    }

    #[test]
    fn test_bp_has_no_trailing_newline() {
        let bytes = Encoding::Bp
            .encode(Namespace::Stampede, "wf.plan", &Attributes::new())
            .unwrap();
        assert_eq!(bytes, b"stampede.wf.plan");
    }

    #[test]
    fn test_json_event_field_is_namespaced() {
        for (ns, expect) in [
            (Namespace::Stampede, "stampede.wf.plan"),
            (Namespace::Dashboard, "dashboard.wf.plan"),
        ] {
            let bytes = Encoding::Json
                .encode(ns, "wf.plan", &Attributes::new())
                .unwrap();
            let doc: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(doc["event"], json!(expect));
        }
    }

    #[test]
    fn test_json_flattens_keys_two_pass() {
        let a = attrs(&[("host__info", json!("n1")), ("job.id", json!(7))]);
        let bytes = Encoding::Json
            .encode(Namespace::Stampede, "job.info", &a)
            .unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        // "__" collapses to "_" because the second pass runs after the
        // dot replacement.
        assert_eq!(doc["host_info"], json!("n1"));
        assert_eq!(doc["job_id"], json!(7));
        assert!(doc.get("host__info").is_none());
    }

    #[test]
    fn test_flatten_idempotent_on_flattened_keys() {
        // Regression guard for the two-pass rule: once a key has been
        // flattened, flattening it again must not change it.
        for key in ["host__info", "job.id", "task.meta.key", "plain"] {
            let once = flatten_key(key);
            assert_eq!(flatten_key(&once), once, "key {key}");
        }
    }

    #[test]
    fn test_json_collapsing_keys_later_wins() {
        let a = attrs(&[("a.b", json!("dotted")), ("a__b", json!("compound"))]);
        let bytes = Encoding::Json
            .encode(Namespace::Stampede, "wf.plan", &a)
            .unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["a_b"], json!("compound"));
    }

    #[test]
    fn test_json_encoder_adds_no_newline() {
        let bytes = Encoding::Json
            .encode(Namespace::Stampede, "wf.plan", &Attributes::new())
            .unwrap();
        assert_ne!(bytes.last(), Some(&b'\n'));
    }

    #[cfg(feature = "bson")]
    #[test]
    fn test_bson_round_trips_event_field() {
        let a = attrs(&[("host__info", json!("n1"))]);
        let bytes = Encoding::Bson
            .encode(Namespace::Stampede, "inv.end", &a)
            .unwrap();
        let doc: bson::Document = bson::from_slice(&bytes).unwrap();
        assert_eq!(doc.get_str("event").unwrap(), "stampede.inv.end");
        // BSON keeps attribute keys untouched (no flattening pass).
        assert_eq!(doc.get_str("host__info").unwrap(), "n1");
    }
}
