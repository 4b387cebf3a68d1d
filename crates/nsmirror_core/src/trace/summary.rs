use nsmirror_codec::EventRecord;
use serde::{Deserialize, Serialize};

/// Payload of a `/finished/<entity>` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedSummary {
    /// Terminal event type (`finished`, `aborted`, `killed`).
    pub state: String,
    /// Event timestamp, seconds since the epoch.
    pub when: f64,
    /// Host that published the terminal event.
    pub host: String,
    /// Terminal event data.
    pub data: String,
}

impl FinishedSummary {
    /// Summary of a terminal event record.
    #[must_use]
    pub fn from_record(record: &EventRecord) -> Self {
        Self {
            state: record.event_type.clone(),
            when: record.timestamp,
            host: record.source.clone(),
            data: record.event_data.clone(),
        }
    }

    /// Parses a summary payload.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Serializes the summary.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let record = EventRecord::new("a#1", 12.5, "h1", "finished", "0.0");
        let summary = FinishedSummary::from_record(&record);
        let value: serde_json::Value = serde_json::from_slice(&summary.to_vec().unwrap()).unwrap();
        assert_eq!(value["state"], "finished");
        assert_eq!(value["when"], 12.5);
        assert_eq!(value["host"], "h1");
        assert_eq!(value["data"], "0.0");
        assert_eq!(FinishedSummary::from_slice(&summary.to_vec().unwrap()).unwrap(), summary);
    }
}
