//! Typed lifecycle events.
//!
//! An [`EventRecord`] carries `event_type` and `event_data` as strings;
//! [`TraceEvent`] is the decoded form. Decoding fails closed: an unknown type
//! or data that does not fit its type yields an error, which
//! [`TraceEvent::from_record`] logs and turns into `None`.

use crate::error::{CodecError, CodecResult};
use crate::event::EventRecord;
use serde::Serialize;

/// Instance event types that end an instance's lifecycle.
pub const TERMINAL_EVENT_TYPES: &[&str] = &["finished", "aborted", "killed"];

/// A decoded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Instance placed on a server.
    Scheduled {
        /// Server the instance was placed on.
        #[serde(rename = "where")]
        where_: String,
        /// Why it was (re)scheduled.
        why: String,
    },
    /// Instance waiting for capacity.
    Pending {
        /// Reason, if any.
        why: String,
    },
    /// Instance container configured.
    Configured {
        /// Unique id of the container run.
        uniqueid: String,
    },
    /// Instance removed from the desired state.
    Deleted,
    /// Instance exited.
    Finished {
        /// Exit code.
        exitcode: i32,
        /// Terminating signal, 0 if none.
        signal: i32,
    },
    /// Instance aborted by the node agent.
    Aborted {
        /// Abort reason.
        why: String,
    },
    /// Instance killed.
    Killed {
        /// Whether the kill was an out-of-memory kill.
        is_oom: bool,
    },
    /// A service inside the instance is running.
    ServiceRunning {
        /// Unique id of the container run.
        uniqueid: String,
        /// Service name.
        service: String,
    },
    /// A service inside the instance exited.
    ServiceExited {
        /// Unique id of the container run.
        uniqueid: String,
        /// Service name.
        service: String,
        /// Exit code.
        exitcode: i32,
        /// Terminating signal, 0 if none.
        signal: i32,
    },
    /// Server changed state (`up`, `down`, `frozen`, ...).
    ServerState {
        /// New state.
        state: String,
    },
    /// Server entered blackout.
    ServerBlackout,
}

impl TraceEvent {
    /// Returns the wire event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Scheduled { .. } => "scheduled",
            Self::Pending { .. } => "pending",
            Self::Configured { .. } => "configured",
            Self::Deleted => "deleted",
            Self::Finished { .. } => "finished",
            Self::Aborted { .. } => "aborted",
            Self::Killed { .. } => "killed",
            Self::ServiceRunning { .. } => "service_running",
            Self::ServiceExited { .. } => "service_exited",
            Self::ServerState { .. } => "server_state",
            Self::ServerBlackout => "server_blackout",
        }
    }

    /// Returns the wire event data.
    #[must_use]
    pub fn event_data(&self) -> String {
        match self {
            Self::Scheduled { where_, why } => format!("{where_}:{why}"),
            Self::Pending { why } | Self::Aborted { why } => why.clone(),
            Self::Configured { uniqueid } => uniqueid.clone(),
            Self::Deleted | Self::ServerBlackout => String::new(),
            Self::Finished { exitcode, signal } => format!("{exitcode}.{signal}"),
            Self::Killed { is_oom } => (if *is_oom { "oom" } else { "" }).to_string(),
            Self::ServiceRunning { uniqueid, service } => format!("{uniqueid}.{service}"),
            Self::ServiceExited {
                uniqueid,
                service,
                exitcode,
                signal,
            } => format!("{uniqueid}.{service}.{exitcode}.{signal}"),
            Self::ServerState { state } => state.clone(),
        }
    }

    /// Returns true if this event ends the instance lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        TERMINAL_EVENT_TYPES.contains(&self.event_type())
    }

    /// Decodes `(event_type, event_data)`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownEventType`] or
    /// [`CodecError::MalformedEventData`].
    pub fn decode(event_type: &str, event_data: &str) -> CodecResult<Self> {
        let bad = || CodecError::malformed_event_data(event_type, event_data);
        let event = match event_type {
            "scheduled" => {
                let (where_, why) = event_data.split_once(':').ok_or_else(bad)?;
                if where_.is_empty() {
                    return Err(bad());
                }
                Self::Scheduled {
                    where_: where_.to_string(),
                    why: why.to_string(),
                }
            }
            "pending" => Self::Pending {
                why: event_data.to_string(),
            },
            "configured" => Self::Configured {
                uniqueid: event_data.to_string(),
            },
            "deleted" => Self::Deleted,
            "finished" => {
                let (exitcode, signal) = parse_exit(event_data).ok_or_else(bad)?;
                Self::Finished { exitcode, signal }
            }
            "aborted" => Self::Aborted {
                why: event_data.to_string(),
            },
            "killed" => Self::Killed {
                is_oom: event_data == "oom",
            },
            "service_running" => {
                let (uniqueid, service) = event_data.split_once('.').ok_or_else(bad)?;
                Self::ServiceRunning {
                    uniqueid: uniqueid.to_string(),
                    service: service.to_string(),
                }
            }
            "service_exited" => {
                let (uniqueid, rest) = event_data.split_once('.').ok_or_else(bad)?;
                let mut tail = rest.rsplitn(3, '.');
                let (Some(signal), Some(exitcode), Some(service)) = (tail.next(), tail.next(), tail.next())
                else {
                    return Err(bad());
                };
                Self::ServiceExited {
                    uniqueid: uniqueid.to_string(),
                    service: service.to_string(),
                    exitcode: exitcode.parse().map_err(|_| bad())?,
                    signal: signal.parse().map_err(|_| bad())?,
                }
            }
            "server_state" => Self::ServerState {
                state: event_data.to_string(),
            },
            "server_blackout" => Self::ServerBlackout,
            other => {
                return Err(CodecError::UnknownEventType {
                    event_type: other.to_string(),
                })
            }
        };
        Ok(event)
    }

    /// Decodes a record, logging and returning `None` if it cannot be decoded.
    #[must_use]
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        match Self::decode(&record.event_type, &record.event_data) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(event = %record, error = %e, "skipping undecodable event");
                None
            }
        }
    }

    /// Builds the record for this event.
    pub fn to_record(&self, entity: impl Into<String>, timestamp: f64, source: impl Into<String>) -> EventRecord {
        EventRecord::new(entity, timestamp, source, self.event_type(), self.event_data())
    }
}

fn parse_exit(data: &str) -> Option<(i32, i32)> {
    let (rc, sig) = data.split_once('.')?;
    Some((rc.parse().ok()?, sig.parse().ok()?))
}
