mod availability;
mod conflict;
mod error;
mod expiry;
pub mod interval;
mod mutations;
mod queries;

pub use availability::{free_windows, merge_overlapping, subtract_intervals, suggest};
pub use conflict::{check_availability, conflicts_with, find_conflicts};
pub use error::EngineError;
pub use expiry::{effective_status, is_completed, sweep};
pub use mutations::SweepOutcome;
pub use queries::ScheduledBooking;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::clock::Clock;
use crate::config::SchedulingPolicy;
use crate::limits::*;
use crate::model::*;
use crate::notify::Notifier;
use crate::store::ReservationStore;

use interval::{duration, parse_hhmm};

/// Booking lifecycle manager.
///
/// Holds no scheduling state of its own: every decision is made from the
/// reservations the store returns at call time, the injected clock, and the
/// policy.
pub struct BookingService {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: SchedulingPolicy,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        policy: SchedulingPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub(super) fn emit(&self, kind: BookingEventKind, reservation: &Reservation) {
        self.notifier.notify(&BookingEvent::new(kind, reservation));
    }

    pub(super) async fn load(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Load a booking the owner may still edit or cancel.
    pub(super) async fn load_editable(
        &self,
        id: Ulid,
        owner_id: &str,
    ) -> Result<Reservation, EngineError> {
        let r = self.load(id).await?;
        if r.owner_id != owner_id {
            return Err(EngineError::Unauthorized(id));
        }
        if !r.status.is_editable() {
            return Err(EngineError::InvalidState {
                id,
                status: r.status,
            });
        }
        Ok(r)
    }

    /// Date and hour policy checks shared by create and reschedule.
    pub(super) fn validate_schedule(
        &self,
        date: NaiveDate,
        start: Minutes,
        end: Minutes,
    ) -> Result<Span, EngineError> {
        if date < self.clock.now().date() {
            return Err(EngineError::PastDate(date));
        }
        if start >= end {
            return Err(EngineError::validation("end must follow start"));
        }
        if duration(start, end) < self.policy.min_duration {
            return Err(EngineError::validation(format!(
                "minimum duration {} minutes",
                self.policy.min_duration
            )));
        }
        if start < self.policy.day_start || end > self.policy.day_end {
            return Err(EngineError::OutOfHours { start, end });
        }
        Ok(Span::new(start, end))
    }
}

/// A required request field, trimmed; blank counts as missing.
fn required(value: Option<String>, field: &str) -> Result<String, EngineError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EngineError::validation(format!("{field} is required"))),
    }
}

fn parse_required_time(value: Option<String>, field: &str) -> Result<Minutes, EngineError> {
    parse_hhmm(&required(value, field)?)
}

fn validate_text(value: &Option<String>, field: &str) -> Result<(), EngineError> {
    if let Some(v) = value
        && v.len() > MAX_PURPOSE_LEN
    {
        return Err(EngineError::validation(format!("{field} too long")));
    }
    Ok(())
}

/// Count an operation outcome for metrics.
fn record<T>(op: &'static str, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(
        crate::observability::BOOKING_OPS_TOTAL,
        "op" => op,
        "status" => status
    )
    .increment(1);
}
