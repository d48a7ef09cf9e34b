use chrono::NaiveDate;
use serde::Serialize;
use ulid::Ulid;

use crate::model::*;

use super::availability::free_windows;
use super::conflict::check_availability;
use super::expiry::effective_status;
use super::interval::parse_hhmm;
use super::{BookingService, EngineError};

/// A reservation with the status it should be displayed with right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledBooking {
    pub reservation: Reservation,
    pub display_status: BookingStatus,
}

impl BookingService {
    /// Can `start`–`end` (`HH:MM`) be booked on this hall/day? Alternatives
    /// are offered when it cannot. `exclude_id` ignores a booking being edited.
    pub async fn check_availability(
        &self,
        resource_id: &str,
        date: NaiveDate,
        start: &str,
        end: &str,
        exclude_id: Option<Ulid>,
    ) -> Result<AvailabilityResult, EngineError> {
        let started = std::time::Instant::now();
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        if start >= end {
            return Err(EngineError::validation("end must follow start"));
        }

        let existing = self.store.fetch_reservations(resource_id, date).await?;
        let result = check_availability(
            resource_id,
            date,
            Span::new(start, end),
            &existing,
            exclude_id,
            &self.policy,
        );

        metrics::histogram!(crate::observability::AVAILABILITY_CHECK_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if !result.is_available {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            metrics::histogram!(crate::observability::SUGGESTIONS_OFFERED)
                .record(result.suggested_slots.len() as f64);
        }
        Ok(result)
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.load(id).await
    }

    /// Every booking on the hall/day, earliest first, with derived status.
    pub async fn day_schedule(
        &self,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledBooking>, EngineError> {
        let now = self.clock.now();
        let mut bookings = self.store.fetch_reservations(resource_id, date).await?;
        bookings.sort_by_key(|r| (r.span.start, r.id));
        Ok(bookings
            .into_iter()
            .map(|reservation| ScheduledBooking {
                display_status: effective_status(&reservation, now),
                reservation,
            })
            .collect())
    }

    /// Stretches of the hall/day still open for booking.
    pub async fn free_windows(
        &self,
        resource_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Span>, EngineError> {
        let existing = self.store.fetch_reservations(resource_id, date).await?;
        Ok(free_windows(resource_id, date, &existing, None, &self.policy))
    }
}
