//! Scan verification.
//!
//! `evaluate` is the decision function: given the loaded session state,
//! enrollment, any existing record, and the submitted scan, it produces a
//! verdict without touching storage or the clock. `ScanService::scan` is the
//! thin orchestration around it: load context, persist the outcome through
//! the ledger, publish the event.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use util::bus::EventBus;

use db::events::AttendanceEvent;
use db::models::attendance_record::{AttendanceStatus, Model as AttendanceRecord};
use db::models::class_session::{self, SessionStatus};
use db::models::enrollment::{self, Role};

use crate::error::AttendanceError;
use crate::ledger::{AttendanceLedger, RecordDraft};
use crate::token;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One scan attempt as submitted by a student device.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub student_id: i64,
    pub submitted_token: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub device_fingerprint: Option<String>,
    pub now: DateTime<Utc>,
}

/// Tunables injected by the caller.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    pub lateness_grace: Duration,
    /// Radius applied when a session has coordinates but no explicit radius.
    pub default_radius_m: f64,
}

/// Everything `evaluate` needs, loaded up front.
pub struct ScanContext<'a> {
    pub session: &'a class_session::Model,
    pub enrolled: bool,
    pub existing: Option<&'a AttendanceRecord>,
    pub policy: &'a ScanPolicy,
}

/// Outcome of the pure decision step.
#[derive(Debug)]
pub enum Verdict {
    /// Accept the scan with the given status (`on_time` or `late`).
    Accepted(AttendanceStatus),
    /// The pair already has an accepted record; echo it, change nothing.
    AlreadyRecorded,
    /// Reject; `persist` carries the record status to write, if any.
    Rejected {
        error: AttendanceError,
        persist: Option<AttendanceStatus>,
    },
}

/// Ordered checks per the verification design; the first failure wins.
pub fn evaluate(ctx: &ScanContext<'_>, input: &ScanInput) -> Verdict {
    // 1. Enrollment
    if !ctx.enrolled {
        return Verdict::Rejected {
            error: AttendanceError::NotEnrolled,
            persist: None,
        };
    }

    // 2. Session state
    if ctx.session.status != SessionStatus::InProgress {
        return Verdict::Rejected {
            error: AttendanceError::SessionNotActive,
            persist: None,
        };
    }

    // 3. Token match
    let current = ctx.session.token.as_deref().unwrap_or("");
    if current.is_empty() || !token::tokens_match(&input.submitted_token, current) {
        return Verdict::Rejected {
            error: AttendanceError::InvalidToken,
            persist: Some(AttendanceStatus::RejectedInvalidToken),
        };
    }

    // 4. Token expiry
    let expired = ctx
        .session
        .token_expires_at
        .is_none_or(|expires| input.now >= expires);
    if expired {
        return Verdict::Rejected {
            error: AttendanceError::TokenExpired,
            persist: Some(AttendanceStatus::RejectedExpiredToken),
        };
    }

    // 5. Duplicate: an accepted outcome is final for this pair.
    if ctx
        .existing
        .map(|r| r.status.is_attended())
        .unwrap_or(false)
    {
        return Verdict::AlreadyRecorded;
    }

    // 6. Geofence, only when the session has a configured location.
    if let (Some(lat), Some(lng)) = (ctx.session.location_lat, ctx.session.location_lng) {
        let radius = ctx
            .session
            .location_radius_m
            .unwrap_or(ctx.policy.default_radius_m);
        match (input.latitude, input.longitude) {
            (Some(scan_lat), Some(scan_lng)) => {
                let distance = haversine_distance_m(lat, lng, scan_lat, scan_lng);
                if distance > radius {
                    return Verdict::Rejected {
                        error: AttendanceError::LocationMismatch {
                            distance_m: Some(distance),
                            radius_m: radius,
                        },
                        persist: Some(AttendanceStatus::RejectedLocation),
                    };
                }
            }
            _ => {
                // The session requires a location but the device sent none.
                return Verdict::Rejected {
                    error: AttendanceError::LocationMismatch {
                        distance_m: None,
                        radius_m: radius,
                    },
                    persist: Some(AttendanceStatus::RejectedLocation),
                };
            }
        }
    }

    // 7. Lateness
    let status = if input.now - ctx.session.scheduled_start > ctx.policy.lateness_grace {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::OnTime
    };
    Verdict::Accepted(status)
}

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// A processed scan, as returned to the caller.
#[derive(Debug)]
pub enum ScanOutcome {
    /// A record was written (or upgraded) for this scan.
    Recorded(AttendanceRecord),
    /// The pair was already accepted; the stored record is echoed unchanged.
    Duplicate(AttendanceRecord),
}

pub struct ScanService;

impl ScanService {
    /// Verifies one scan against a session of the given class.
    ///
    /// Rejections with a persistable status are written to the ledger before
    /// the error is returned, so absence and fraud patterns stay auditable.
    pub async fn scan(
        db: &DatabaseConnection,
        events: &EventBus,
        class_id: i64,
        session_id: i64,
        input: ScanInput,
        policy: &ScanPolicy,
    ) -> Result<ScanOutcome, AttendanceError> {
        let session = class_session::Entity::find()
            .filter(class_session::Column::Id.eq(session_id))
            .filter(class_session::Column::ClassId.eq(class_id))
            .one(db)
            .await?
            .ok_or(AttendanceError::SessionNotFound)?;

        let enrolled =
            enrollment::Model::is_in_role(db, input.student_id, class_id, Role::Student).await?;
        let existing = AttendanceLedger::record_for(db, session_id, input.student_id).await?;

        let ctx = ScanContext {
            session: &session,
            enrolled,
            existing: existing.as_ref(),
            policy,
        };

        match evaluate(&ctx, &input) {
            Verdict::Accepted(status) => {
                let (record, _) = AttendanceLedger::append(db, draft_from(&input, session_id, status))
                    .await?;
                publish_recorded(events, &record).await;
                Ok(ScanOutcome::Recorded(record))
            }
            Verdict::AlreadyRecorded => {
                let record = existing.expect("duplicate verdict implies an existing record");
                Ok(ScanOutcome::Duplicate(record))
            }
            Verdict::Rejected { error, persist } => {
                if let Some(status) = persist {
                    let (record, written) =
                        AttendanceLedger::append(db, draft_from(&input, session_id, status)).await?;
                    if written {
                        publish_recorded(events, &record).await;
                    }
                }
                log::info!(
                    "scan rejected: session={session_id} student={} kind={}",
                    input.student_id,
                    error.kind()
                );
                Err(error)
            }
        }
    }
}

fn draft_from(input: &ScanInput, session_id: i64, status: AttendanceStatus) -> RecordDraft {
    RecordDraft {
        session_id,
        student_id: input.student_id,
        status,
        checkin_time: Some(input.now),
        latitude: input.latitude,
        longitude: input.longitude,
        device_fingerprint: input.device_fingerprint.clone(),
    }
}

async fn publish_recorded(events: &EventBus, record: &AttendanceRecord) {
    let event = AttendanceEvent::AttendanceRecorded {
        student_id: record.student_id,
        session_id: record.session_id,
        status: record.status.clone(),
        recorded_at: record.updated_at,
    };
    if let Ok(payload) = serde_json::to_string(&event) {
        events.publish(&event.topic(), payload).await;
    }
}
