//! # Dotted-key configuration properties.
//!
//! Sinks are parameterized by an ordered, read-only key/value store with
//! dotted keys, scoped by prefix stripping: properties under `x.y.*`
//! become keys under `y.*` when handed to a sub-component.
//!
//! Recognized suffixes at the sink layer:
//! - `.url` — declares an additional multiplexed destination
//! - `events` — comma-separated filter patterns or `*`
//! - `timeout` — connection timeout in seconds (floating point)
//!
//! ## Example
//! ```rust
//! use eventflux::Properties;
//!
//! let mut props = Properties::new();
//! props.set("audit.url", "file:///var/log/audit.json");
//! props.set("audit.events", "*");
//!
//! let scoped = props.subset("audit.");
//! assert_eq!(scoped.get("url"), Some("file:///var/log/audit.json"));
//! assert_eq!(scoped.get("events"), Some("*"));
//! ```

use std::time::Duration;

use indexmap::IndexMap;

use crate::error::SinkError;

/// Ordered mapping of dotted configuration keys to string values.
///
/// Insertion order is preserved, which keeps multiplexed sub-destinations
/// in the order they were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    map: IndexMap<String, String>,
}

impl Properties {
    /// Creates an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Inserts or replaces a property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Removes a property, returning its previous value.
    ///
    /// Preserves the relative order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.shift_remove(key)
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of properties.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if there are no properties.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the properties whose keys start with `prefix`, with the
    /// prefix stripped. Order is preserved.
    #[must_use]
    pub fn subset(&self, prefix: &str) -> Properties {
        let map = self
            .map
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect();
        Properties { map }
    }

    /// Parses the `timeout` property as seconds (floating point).
    ///
    /// Absent → `Ok(None)`; present but unparsable → configuration error.
    pub fn connect_timeout(&self) -> Result<Option<Duration>, SinkError> {
        match self.get("timeout") {
            None => Ok(None),
            Some(raw) => {
                let secs: f64 = raw.parse().map_err(|_| SinkError::InvalidProperty {
                    key: "timeout".to_string(),
                    value: raw.to_string(),
                })?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(SinkError::InvalidProperty {
                        key: "timeout".to_string(),
                        value: raw.to_string(),
                    });
                }
                Ok(Some(Duration::from_secs_f64(secs)))
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Properties { map }
    }
}
