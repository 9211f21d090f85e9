//! # Event-name filtering for broker destinations.
//!
//! Broker destinations can carry high event volume, so they filter on the
//! fully-namespaced event name before anything is encoded or queued.
//!
//! The filter is computed once at sink construction from the `events`
//! configuration property and is immutable afterward:
//! - value `*` — accept-all mode, no matching performed;
//! - absent — a curated default set of four high-value, low-volume events;
//! - otherwise — comma-separated patterns, each compiled as a regex and
//!   searched (not anchored) against the table of recognized event names.
//!
//! [`RECOGNIZED_EVENTS`] is an immutable static table; matching happens
//! once at construction, so [`EventFilter::ignore`] is O(1) set lookup.

use std::collections::HashSet;

use regex::Regex;

use crate::error::SinkError;

/// Every fully-namespaced event name the workflow loader understands.
///
/// Kept consistent with the record loader's event dictionary; filter
/// patterns are matched against this table, never against live traffic.
pub const RECOGNIZED_EVENTS: &[&str] = &[
    "stampede.wf.plan",
    "stampede.wf.map.task_job",
    "stampede.static.start",
    "stampede.static.end",
    "stampede.xwf.start",
    "stampede.xwf.end",
    "stampede.xwf.map.subwf_job",
    "stampede.task.info",
    "stampede.task.edge",
    "stampede.job.info",
    "stampede.job.edge",
    "stampede.job_inst.pre.start",
    "stampede.job_inst.pre.term",
    "stampede.job_inst.pre.end",
    "stampede.job_inst.submit.start",
    "stampede.job_inst.submit.end",
    "stampede.job_inst.held.start",
    "stampede.job_inst.held.end",
    "stampede.job_inst.main.start",
    "stampede.job_inst.main.term",
    "stampede.job_inst.main.end",
    "stampede.job_inst.post.start",
    "stampede.job_inst.post.term",
    "stampede.job_inst.post.end",
    "stampede.job_inst.host.info",
    "stampede.job_inst.image.info",
    "stampede.job_inst.abort.info",
    "stampede.job_inst.grid.submit.start",
    "stampede.job_inst.grid.submit.end",
    "stampede.job_inst.globus.submit.start",
    "stampede.job_inst.globus.submit.end",
    "stampede.job_inst.tag",
    "stampede.job_inst.composite",
    "stampede.inv.start",
    "stampede.inv.end",
    "stampede.static.meta.start",
    "stampede.xwf.meta",
    "stampede.task.meta",
    "stampede.rc.meta",
    "stampede.int.metric",
    "stampede.rc.pfn",
    "stampede.wf.map.file",
    "stampede.static.meta.end",
    "stampede.task.monitoring",
];

/// Default patterns applied when no `events` property is configured:
/// representative high-value, low-volume events.
const DEFAULT_PATTERNS: &[&str] = &[
    "stampede.job_inst.tag",
    "stampede.job_inst.composite",
    "stampede.inv.end",
    "stampede.wf.plan",
];

/// Compiled accept set for fully-namespaced event names.
#[derive(Debug, Clone)]
pub struct EventFilter {
    accept_all: bool,
    accepted: HashSet<String>,
}

impl EventFilter {
    /// Builds a filter from the `events` configuration property.
    ///
    /// `None` selects the curated defaults; `*` anywhere in the list
    /// short-circuits into accept-all mode. Patterns that fail to compile
    /// are configuration errors.
    pub fn from_property(events: Option<&str>) -> Result<EventFilter, SinkError> {
        let mut patterns = Vec::new();

        match events {
            None => {
                for pat in DEFAULT_PATTERNS {
                    patterns.push(Self::compile(pat)?);
                }
            }
            Some(spec) => {
                for token in spec.split(',') {
                    if token == "*" {
                        tracing::debug!("events handled: all");
                        return Ok(EventFilter {
                            accept_all: true,
                            accepted: HashSet::new(),
                        });
                    }
                    patterns.push(Self::compile(token)?);
                }
            }
        }

        // Match each pattern against the recognized-event table once.
        let mut accepted = HashSet::new();
        for regex in &patterns {
            for event in RECOGNIZED_EVENTS {
                if regex.find(event).is_some() {
                    accepted.insert((*event).to_string());
                }
            }
        }

        tracing::debug!(count = accepted.len(), "events handled");
        Ok(EventFilter {
            accept_all: false,
            accepted,
        })
    }

    fn compile(pattern: &str) -> Result<Regex, SinkError> {
        Regex::new(pattern).map_err(|e| SinkError::InvalidFilter {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    }

    /// Returns true if the fully-namespaced event should be dropped.
    pub fn ignore(&self, full_event: &str) -> bool {
        if self.accept_all {
            return false;
        }
        !self.accepted.contains(full_event)
    }

    /// True when the filter was built in `*` accept-all mode.
    pub fn accepts_all(&self) -> bool {
        self.accept_all
    }

    /// Number of concrete event names in the accept set (0 in accept-all mode).
    pub fn accepted_len(&self) -> usize {
        self.accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_accepts_curated_four() {
        let filter = EventFilter::from_property(None).unwrap();
        assert!(!filter.ignore("stampede.job_inst.tag"));
        assert!(!filter.ignore("stampede.job_inst.composite"));
        assert!(!filter.ignore("stampede.inv.end"));
        assert!(!filter.ignore("stampede.wf.plan"));
    }

    #[test]
    fn test_default_filter_drops_everything_else() {
        let filter = EventFilter::from_property(None).unwrap();
        for event in RECOGNIZED_EVENTS {
            let curated = matches!(
                *event,
                "stampede.job_inst.tag"
                    | "stampede.job_inst.composite"
                    | "stampede.inv.end"
                    | "stampede.wf.plan"
            );
            assert_eq!(filter.ignore(event), !curated, "event {event}");
        }
        assert!(filter.ignore("stampede.job_inst.main.start"));
    }

    #[test]
    fn test_wildcard_accepts_arbitrary_names() {
        let filter = EventFilter::from_property(Some("*")).unwrap();
        assert!(filter.accepts_all());

        // Names never seen in the recognized table must pass too.
        for i in 0..50 {
            let name = format!("stampede.synthetic.ev{:x}", i * 2654435761u64);
            assert!(!filter.ignore(&name));
        }
    }

    #[test]
    fn test_wildcard_anywhere_in_list_short_circuits() {
        let filter = EventFilter::from_property(Some("inv.end,*")).unwrap();
        assert!(filter.accepts_all());
    }

    #[test]
    fn test_pattern_is_substring_search() {
        let filter = EventFilter::from_property(Some("job_inst.pre")).unwrap();
        assert!(!filter.ignore("stampede.job_inst.pre.start"));
        assert!(!filter.ignore("stampede.job_inst.pre.term"));
        assert!(!filter.ignore("stampede.job_inst.pre.end"));
        assert!(filter.ignore("stampede.job_inst.post.start"));
        assert_eq!(filter.accepted_len(), 3);
    }

    #[test]
    fn test_patterns_only_match_recognized_names() {
        let filter = EventFilter::from_property(Some("synthetic")).unwrap();
        // Matches nothing in the table, so nothing is accepted even if
        // live traffic would contain the substring.
        assert!(filter.ignore("stampede.synthetic.event"));
        assert_eq!(filter.accepted_len(), 0);
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let err = EventFilter::from_property(Some("inv.end,(((")).unwrap_err();
        assert_eq!(err.as_label(), "invalid_filter");
    }
}
