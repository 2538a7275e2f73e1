//! Domain events emitted by the attendance engine.
//!
//! Events are serialized and published on the injected event bus; the
//! messaging/notification subsystem forwards them to its own transports. The
//! engine itself never talks to a transport directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::attendance_record::AttendanceStatus;
use crate::models::class_session::SessionStatus;

/// All events the attendance engine publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AttendanceEvent {
    /// A lecturer started a session; scanning is now open.
    SessionStarted {
        session_id: i64,
        class_id: i64,
        started_by: i64,
        token_expires_at: DateTime<Utc>,
    },

    /// The session's QR token was replaced.
    TokenRotated {
        session_id: i64,
        token_expires_at: DateTime<Utc>,
    },

    /// A session reached a terminal state.
    SessionEnded {
        session_id: i64,
        class_id: i64,
        outcome: SessionStatus,
    },

    /// A verification outcome was written to the ledger.
    AttendanceRecorded {
        student_id: i64,
        session_id: i64,
        status: AttendanceStatus,
        recorded_at: DateTime<Utc>,
    },
}

impl AttendanceEvent {
    /// Bus topic for one session's listeners.
    pub fn session_topic(session_id: i64) -> String {
        format!("attendance.session.{session_id}")
    }

    /// The topic this event is published on.
    pub fn topic(&self) -> String {
        match self {
            AttendanceEvent::SessionStarted { session_id, .. }
            | AttendanceEvent::TokenRotated { session_id, .. }
            | AttendanceEvent::SessionEnded { session_id, .. }
            | AttendanceEvent::AttendanceRecorded { session_id, .. } => {
                Self::session_topic(*session_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = AttendanceEvent::AttendanceRecorded {
            student_id: 7,
            session_id: 3,
            status: AttendanceStatus::OnTime,
            recorded_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "attendance_recorded");
        assert_eq!(json["data"]["status"], "on_time");
        assert_eq!(event.topic(), "attendance.session.3");
    }
}
