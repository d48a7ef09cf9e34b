use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::StoreError;

use super::availability::suggest;
use super::conflict::check_availability;
use super::expiry::sweep;
use super::interval::{buffered_window, duration, parse_hhmm};
use super::{
    BookingService, EngineError, parse_required_time, record, required, validate_text,
};

/// Result of `BookingService::sweep_expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Throttled: the previous sweep was too recent.
    Skipped { next_due: NaiveDateTime },
    Swept { completed: usize, at: NaiveDateTime },
}

impl BookingService {
    /// Validate, conflict-check and store a new pending booking.
    pub async fn create_booking(
        &self,
        request: BookingRequest,
        owner_id: &str,
    ) -> Result<Reservation, EngineError> {
        let result = self.create_booking_inner(request, owner_id).await;
        record("create", &result);
        result
    }

    async fn create_booking_inner(
        &self,
        request: BookingRequest,
        owner_id: &str,
    ) -> Result<Reservation, EngineError> {
        let resource_id = required(request.resource_id, "resource_id")?;
        let date = request
            .date
            .ok_or_else(|| EngineError::validation("date is required"))?;
        let start = parse_required_time(request.start_time, "start_time")?;
        let end = parse_required_time(request.end_time, "end_time")?;
        if resource_id.len() > MAX_ID_LEN || owner_id.len() > MAX_ID_LEN {
            return Err(EngineError::validation("identifier too long"));
        }
        validate_text(&request.purpose, "purpose")?;

        let span = self.validate_schedule(date, start, end)?;
        self.ensure_available(&resource_id, date, span, None).await?;

        let now = self.clock.now();
        let hall = resource_id.clone();
        let reservation = Reservation {
            id: Ulid::new(),
            resource_id,
            owner_id: owner_id.to_string(),
            date,
            span,
            buffered: self.buffered(span),
            duration_minutes: duration(start, end),
            status: BookingStatus::Pending,
            purpose: request.purpose,
            attendees: request.attendees,
            priority: request.priority,
            cancellation_reason: None,
            auto_approved: false,
            created_at: now,
            updated_at: now,
        };

        let stored = match self.store.insert_reservation(reservation).await {
            Ok(r) => r,
            Err(StoreError::Conflict(hits)) => {
                return Err(self.lost_race(&hall, date, span, None, hits).await);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            id = %stored.id,
            hall = %stored.resource_id,
            date = %stored.date,
            slot = %stored.span,
            "booking created"
        );
        self.emit(BookingEventKind::Created, &stored);
        Ok(stored)
    }

    /// Apply an owner's edit. Moving the slot re-runs every create check,
    /// ignoring the booking's own current footprint.
    pub async fn update_booking(
        &self,
        id: Ulid,
        patch: BookingPatch,
        owner_id: &str,
    ) -> Result<Reservation, EngineError> {
        let result = self.update_booking_inner(id, patch, owner_id).await;
        record("update", &result);
        result
    }

    async fn update_booking_inner(
        &self,
        id: Ulid,
        patch: BookingPatch,
        owner_id: &str,
    ) -> Result<Reservation, EngineError> {
        // The write is conditional on the status read here; an approval or
        // cancellation landing in between sends us round again.
        let mut last_seen = None;
        for _ in 0..3 {
            let current = self.load_editable(id, owner_id).await?;
            let next = self.apply_patch(&current, &patch).await?;
            let (span, date) = (next.span, next.date);
            match self.store.update_reservation(next, current.status).await {
                Ok(stored) => {
                    info!(id = %id, slot = %stored.span, date = %stored.date, "booking updated");
                    return Ok(stored);
                }
                Err(StoreError::Conflict(hits)) => {
                    return Err(self
                        .lost_race(&current.resource_id, date, span, Some(id), hits)
                        .await);
                }
                Err(StoreError::StatusChanged { current, .. }) => {
                    debug!(id = %id, status = %current, "status moved during update, retrying");
                    last_seen = Some(current);
                }
                Err(e) => return Err(e.into()),
            }
        }
        let status = match last_seen {
            Some(status) => status,
            None => self.load(id).await?.status,
        };
        Err(EngineError::InvalidState { id, status })
    }

    /// `current` with the patch applied and schedule changes re-validated.
    async fn apply_patch(
        &self,
        current: &Reservation,
        patch: &BookingPatch,
    ) -> Result<Reservation, EngineError> {
        let id = current.id;
        let mut next = current.clone();

        if patch.touches_schedule() {
            let date = patch.date.unwrap_or(current.date);
            let start = match &patch.start_time {
                Some(s) => parse_hhmm(s)?,
                None => current.span.start,
            };
            let end = match &patch.end_time {
                Some(s) => parse_hhmm(s)?,
                None => current.span.end,
            };
            let span = self.validate_schedule(date, start, end)?;
            self.ensure_available(&current.resource_id, date, span, Some(id))
                .await?;

            next.date = date;
            next.span = span;
            next.buffered = self.buffered(span);
            next.duration_minutes = duration(start, end);
        }

        if patch.purpose.is_some() {
            validate_text(&patch.purpose, "purpose")?;
            next.purpose = patch.purpose.clone();
        }
        if let Some(attendees) = patch.attendees {
            next.attendees = attendees;
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        next.updated_at = self.clock.now();
        Ok(next)
    }

    /// Owner cancellation of a pending or approved booking.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        owner_id: &str,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let result = self.cancel_booking_inner(id, owner_id, reason).await;
        record("cancel", &result);
        result
    }

    async fn cancel_booking_inner(
        &self,
        id: Ulid,
        owner_id: &str,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_text(&reason, "reason")?;
        // Status may move underneath us (e.g. approval); retry on a lost CAS.
        for _ in 0..3 {
            let mut current = self.load_editable(id, owner_id).await?;
            if !current.is_active() {
                return Err(EngineError::InvalidState {
                    id,
                    status: current.status,
                });
            }
            let now = self.clock.now();
            let moved = self
                .store
                .transition_status(id, current.status, BookingStatus::Cancelled, reason.clone(), now)
                .await?;
            if moved {
                current.status = BookingStatus::Cancelled;
                if reason.is_some() {
                    current.cancellation_reason = reason;
                }
                current.updated_at = now;
                info!(id = %id, "booking cancelled");
                self.emit(BookingEventKind::Cancelled, &current);
                return Ok(current);
            }
        }
        let current = self.load(id).await?;
        Err(EngineError::InvalidState {
            id,
            status: current.status,
        })
    }

    /// Admin approval of a pending booking.
    pub async fn approve_booking(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let result = self
            .decide(id, BookingStatus::Approved, None, BookingEventKind::Approved)
            .await;
        record("approve", &result);
        result
    }

    /// Admin rejection of a pending booking.
    pub async fn reject_booking(
        &self,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let result = self
            .decide(id, BookingStatus::Rejected, reason, BookingEventKind::Rejected)
            .await;
        record("reject", &result);
        result
    }

    async fn decide(
        &self,
        id: Ulid,
        next: BookingStatus,
        reason: Option<String>,
        kind: BookingEventKind,
    ) -> Result<Reservation, EngineError> {
        validate_text(&reason, "reason")?;
        let mut current = self.load(id).await?;
        if current.status != BookingStatus::Pending {
            return Err(EngineError::InvalidState {
                id,
                status: current.status,
            });
        }
        let now = self.clock.now();
        let moved = self
            .store
            .transition_status(id, BookingStatus::Pending, next, reason.clone(), now)
            .await?;
        if !moved {
            let fresh = self.load(id).await?;
            return Err(EngineError::InvalidState {
                id,
                status: fresh.status,
            });
        }
        current.status = next;
        if reason.is_some() {
            current.cancellation_reason = reason;
        }
        current.updated_at = now;
        info!(id = %id, status = %next, "booking decided");
        self.emit(kind, &current);
        Ok(current)
    }

    /// Move finished approved bookings to completed.
    ///
    /// `last_sweep` is the caller's record of the previous run; a call within
    /// `policy.sweep_min_interval` of it does nothing.
    pub async fn sweep_expired(
        &self,
        last_sweep: Option<NaiveDateTime>,
    ) -> Result<SweepOutcome, EngineError> {
        let now = self.clock.now();
        if let Some(last) = last_sweep
            && now - last < self.policy.sweep_min_interval
        {
            metrics::counter!(crate::observability::SWEEP_SKIPPED_TOTAL).increment(1);
            return Ok(SweepOutcome::Skipped {
                next_due: last + self.policy.sweep_min_interval,
            });
        }

        let mut approved = self.store.fetch_by_status(BookingStatus::Approved).await?;
        let due = sweep(&mut approved, now);
        let mut completed = 0;
        if due > 0 {
            for r in approved
                .iter()
                .filter(|r| r.status == BookingStatus::Completed)
            {
                // Lost CAS means another sweeper or a cancellation got there first.
                if self
                    .store
                    .transition_status(r.id, BookingStatus::Approved, BookingStatus::Completed, None, now)
                    .await?
                {
                    completed += 1;
                }
            }
        }
        metrics::counter!(crate::observability::SWEEP_COMPLETED_TOTAL).increment(completed as u64);
        debug!(due, completed, "expiry sweep");
        Ok(SweepOutcome::Swept {
            completed,
            at: now,
        })
    }

    // ── helpers ──────────────────────────────────────────────

    fn buffered(&self, span: Span) -> Span {
        buffered_window(
            span,
            self.policy.buffer_minutes,
            self.policy.day_start,
            self.policy.day_end,
        )
    }

    async fn ensure_available(
        &self,
        resource_id: &str,
        date: chrono::NaiveDate,
        span: Span,
        exclude_id: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let existing = self.store.fetch_reservations(resource_id, date).await?;
        let result = check_availability(resource_id, date, span, &existing, exclude_id, &self.policy);
        if result.is_available {
            return Ok(());
        }
        metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
        debug!(hall = %resource_id, %date, slot = %span, "slot unavailable");
        Err(EngineError::Conflict {
            conflicts: result.conflicting_reservations,
            suggestions: result.suggested_slots,
        })
    }

    /// The store refused a write another caller beat us to. Report it like a
    /// detected conflict, with suggestions computed from fresh state.
    async fn lost_race(
        &self,
        resource_id: &str,
        date: chrono::NaiveDate,
        span: Span,
        exclude_id: Option<Ulid>,
        hits: Vec<Reservation>,
    ) -> EngineError {
        metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
        let suggestions = match self.store.fetch_reservations(resource_id, date).await {
            Ok(existing) => suggest(resource_id, date, span, &existing, exclude_id, &self.policy),
            Err(e) => {
                warn!(hall = %resource_id, %date, "no suggestions after lost race: {e}");
                Vec::new()
            }
        };
        EngineError::Conflict {
            conflicts: hits,
            suggestions,
        }
    }
}
