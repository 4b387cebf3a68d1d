//! Event node names.
//!
//! Every lifecycle event is a node whose *name* carries the whole record:
//!
//! ```text
//! {entity},{timestamp},{source},{event_type},{event_data}
//! ```
//!
//! Fields are comma-delimited with no escaping. Producers must not embed
//! commas in `entity`, `source` or `event_type`; a comma inside
//! `event_data` survives because parsing stops after the fourth delimiter.
//!
//! ## Ordering
//!
//! Records order by `timestamp`, then by the full node name. Two records are
//! equal only when every field is equal, which is what duplicate suppression
//! relies on.

use crate::error::{CodecError, CodecResult};
use std::cmp::Ordering;
use std::fmt;

/// Field delimiter in event node names.
pub const FIELD_DELIMITER: char = ',';

/// One lifecycle event of one entity.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Entity the event belongs to (e.g. `proid.app#0000000001` or a hostname).
    pub entity: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Who published the event (usually a hostname).
    pub source: String,
    /// Event type tag.
    pub event_type: String,
    /// Type-specific data.
    pub event_data: String,
}

impl EventRecord {
    /// Creates a record.
    pub fn new(
        entity: impl Into<String>,
        timestamp: f64,
        source: impl Into<String>,
        event_type: impl Into<String>,
        event_data: impl Into<String>,
    ) -> Self {
        debug_assert!(timestamp.is_finite(), "event timestamp must be finite");
        Self {
            entity: entity.into(),
            timestamp,
            source: source.into(),
            event_type: event_type.into(),
            event_data: event_data.into(),
        }
    }

    /// Parses a node name.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedName`] if the name has fewer than five
    /// fields, an empty entity, or a timestamp that is not a finite number.
    pub fn parse(name: &str) -> CodecResult<Self> {
        let mut fields = name.splitn(5, FIELD_DELIMITER);
        let (Some(entity), Some(ts), Some(source), Some(event_type), Some(event_data)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(CodecError::malformed_name(name, "expected 5 fields"));
        };
        if entity.is_empty() {
            return Err(CodecError::malformed_name(name, "empty entity"));
        }
        let timestamp: f64 = ts
            .parse()
            .map_err(|_| CodecError::malformed_name(name, "timestamp is not a number"))?;
        if !timestamp.is_finite() {
            return Err(CodecError::malformed_name(name, "timestamp is not finite"));
        }
        Ok(Self {
            entity: entity.to_string(),
            timestamp,
            source: source.to_string(),
            event_type: event_type.to_string(),
            event_data: event_data.to_string(),
        })
    }

    /// Formats the node name.
    #[must_use]
    pub fn node_name(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.entity, self.timestamp, self.source, self.event_type, self.event_data
        )
    }

    /// Returns true if this record belongs to `entity`.
    #[must_use]
    pub fn belongs_to(&self, entity: &str) -> bool {
        self.entity == entity
    }
}

impl PartialEq for EventRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventRecord {}

impl PartialOrd for EventRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then_with(|| self.node_name().cmp(&other.node_name()))
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node_name())
    }
}

/// Returns the entity field of a node name without parsing the rest.
#[must_use]
pub fn entity_of(name: &str) -> Option<&str> {
    name.split_once(FIELD_DELIMITER).map(|(entity, _)| entity)
}

/// Returns the glob that matches every event name of `entity`.
///
/// SQLite `GLOB` metacharacters in the entity are bracket-escaped.
#[must_use]
pub fn entity_glob(entity: &str) -> String {
    let mut out = String::with_capacity(entity.len() + 2);
    for c in entity.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out.push(FIELD_DELIMITER);
    out.push('*');
    out
}

/// Parses every well-formed name, logs and skips the rest, and sorts the result.
pub fn parse_sorted<'a, I>(names: I) -> Vec<EventRecord>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut records: Vec<EventRecord> = names
        .into_iter()
        .filter_map(|name| match EventRecord::parse(name) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(name, error = %e, "skipping malformed event node");
                None
            }
        })
        .collect();
    records.sort();
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let name = "proid.app#0000000001,1000.5,host1,scheduled,host2:created";
        let record = EventRecord::parse(name).unwrap();
        assert_eq!(record.entity, "proid.app#0000000001");
        assert_eq!(record.timestamp, 1000.5);
        assert_eq!(record.source, "host1");
        assert_eq!(record.event_type, "scheduled");
        assert_eq!(record.event_data, "host2:created");
        assert_eq!(record.node_name(), name);
    }

    #[test]
    fn integral_timestamp_formats_without_fraction() {
        let record = EventRecord::new("a#1", 1000.0, "s", "pending", "");
        assert_eq!(record.node_name(), "a#1,1000,s,pending,");
    }

    #[test]
    fn comma_in_event_data_is_kept() {
        let record = EventRecord::parse("a#1,1,s,aborted,why,more").unwrap();
        assert_eq!(record.event_data, "why,more");
    }

    #[test]
    fn comma_in_source_misaligns_fields() {
        // Unescaped delimiter: the type silently becomes the second half of the source.
        let record = EventRecord::parse("a#1,1,host,x,pending,").unwrap();
        assert_eq!(record.source, "host");
        assert_eq!(record.event_type, "x");
        assert_eq!(record.event_data, "pending,");
    }

    #[test]
    fn parse_rejects_short_names() {
        assert!(EventRecord::parse("a#1,1000,s,pending").is_err());
        assert!(EventRecord::parse("").is_err());
    }

    #[test]
    fn parse_rejects_bad_timestamps() {
        assert!(EventRecord::parse("a#1,abc,s,pending,").is_err());
        assert!(EventRecord::parse("a#1,inf,s,pending,").is_err());
        assert!(EventRecord::parse("a#1,NaN,s,pending,").is_err());
        assert!(EventRecord::parse(",1,s,pending,").is_err());
    }

    #[test]
    fn ordering_by_timestamp_then_name() {
        let a = EventRecord::new("x#1", 2.0, "s", "pending", "");
        let b = EventRecord::new("x#1", 10.0, "s", "pending", "");
        let c = EventRecord::new("x#1", 10.0, "s", "scheduled", "h:");
        // Numeric, not lexical, timestamp comparison.
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn equality_is_full_tuple() {
        let a = EventRecord::new("x#1", 2.0, "s", "pending", "");
        let b = EventRecord::new("x#1", 2.0, "s", "pending", "other");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn entity_glob_escapes_metacharacters() {
        assert_eq!(entity_glob("proid.app#0001"), "proid.app#0001,*");
        assert_eq!(entity_glob("a*b?[c"), "a[*]b[?][[]c,*");
    }

    #[test]
    fn parse_sorted_skips_malformed() {
        let names = ["a#1,3,s,pending,", "garbage", "a#1,1,s,pending,"];
        let records = parse_sorted(names.iter().copied());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1.0);
    }

    #[test]
    fn entity_of_prefix() {
        assert_eq!(entity_of("a#1,1,s,t,d"), Some("a#1"));
        assert_eq!(entity_of("nocomma"), None);
    }
}
