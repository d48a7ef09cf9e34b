use chrono::NaiveDate;
use ulid::Ulid;

use crate::config::SchedulingPolicy;
use crate::model::*;

use super::availability::suggest;

/// True when `candidate` comes closer than `buffer` minutes to `existing`.
///
/// Equivalent to `candidate` overlapping the clamped buffered window of
/// `existing` for any candidate inside opening hours. A gap of exactly
/// `buffer` minutes is not a conflict.
pub fn conflicts_with(candidate: &Span, existing: &Span, buffer: Minutes) -> bool {
    candidate.start < existing.end + buffer && candidate.end > existing.start - buffer
}

/// Reservations that still hold a slot on this hall/day.
pub(crate) fn competing<'a>(
    reservations: &'a [Reservation],
    resource_id: &'a str,
    date: NaiveDate,
    exclude_id: Option<Ulid>,
) -> impl Iterator<Item = &'a Reservation> + 'a {
    reservations.iter().filter(move |r| {
        r.resource_id == resource_id
            && r.date == date
            && r.is_active()
            && Some(r.id) != exclude_id
    })
}

/// Active reservations on the same hall/day that `span` collides with, by start time.
pub fn find_conflicts(
    resource_id: &str,
    date: NaiveDate,
    span: &Span,
    reservations: &[Reservation],
    exclude_id: Option<Ulid>,
    buffer: Minutes,
) -> Vec<Reservation> {
    let mut hits: Vec<Reservation> = competing(reservations, resource_id, date, exclude_id)
        .filter(|r| conflicts_with(span, &r.span, buffer))
        .cloned()
        .collect();
    hits.sort_by_key(|r| (r.span.start, r.id));
    hits
}

/// Decide whether `span` can be booked and, if not, offer alternatives.
pub fn check_availability(
    resource_id: &str,
    date: NaiveDate,
    span: Span,
    reservations: &[Reservation],
    exclude_id: Option<Ulid>,
    policy: &SchedulingPolicy,
) -> AvailabilityResult {
    let conflicts = find_conflicts(
        resource_id,
        date,
        &span,
        reservations,
        exclude_id,
        policy.buffer_minutes,
    );
    if conflicts.is_empty() {
        return AvailabilityResult {
            is_available: true,
            conflicting_reservations: Vec::new(),
            suggested_slots: Vec::new(),
            next_available_slot: None,
        };
    }

    let suggested_slots = suggest(resource_id, date, span, reservations, exclude_id, policy);
    AvailabilityResult {
        is_available: false,
        conflicting_reservations: conflicts,
        next_available_slot: suggested_slots.first().copied(),
        suggested_slots,
    }
}
