use chrono::NaiveDate;
use ulid::Ulid;

use crate::config::SchedulingPolicy;
use crate::model::*;

use super::conflict::{competing, conflicts_with};

// ── Slot suggestions ─────────────────────────────────────────────

/// Alternative slots of the requested duration, earliest first.
///
/// Candidates start every `suggestion_step` minutes from opening up to
/// `last_suggestion_start`; a candidate is kept only if it clears the buffer
/// around every competing reservation, so each suggestion passes
/// `check_availability` against the same set.
pub fn suggest(
    resource_id: &str,
    date: NaiveDate,
    requested: Span,
    reservations: &[Reservation],
    exclude_id: Option<Ulid>,
    policy: &SchedulingPolicy,
) -> Vec<Span> {
    let wanted = requested.duration();
    if wanted <= 0 || policy.suggestion_step <= 0 {
        return Vec::new();
    }
    let taken: Vec<Span> = competing(reservations, resource_id, date, exclude_id)
        .map(|r| r.span)
        .collect();

    let mut slots = Vec::with_capacity(policy.max_suggestions);
    let mut start = policy.day_start;
    while start <= policy.last_suggestion_start && slots.len() < policy.max_suggestions {
        let end = start + wanted;
        if end > policy.day_end {
            break;
        }
        let candidate = Span::new(start, end);
        if !taken
            .iter()
            .any(|t| conflicts_with(&candidate, t, policy.buffer_minutes))
        {
            slots.push(candidate);
        }
        start += policy.suggestion_step;
    }
    slots
}

// ── Free windows ─────────────────────────────────────────────────

/// Opening hours minus the buffered window of every competing reservation.
///
/// A span inside opening hours is bookable iff one returned window contains it.
pub fn free_windows(
    resource_id: &str,
    date: NaiveDate,
    reservations: &[Reservation],
    exclude_id: Option<Ulid>,
    policy: &SchedulingPolicy,
) -> Vec<Span> {
    if policy.day_start >= policy.day_end {
        return Vec::new();
    }
    let mut blocked: Vec<Span> = competing(reservations, resource_id, date, exclude_id)
        .filter_map(|r| {
            let start = (r.span.start - policy.buffer_minutes).max(policy.day_start);
            let end = (r.span.end + policy.buffer_minutes).min(policy.day_end);
            (start < end).then(|| Span::new(start, end))
        })
        .collect();
    let day = [Span::new(policy.day_start, policy.day_end)];
    if blocked.is_empty() {
        return day.to_vec();
    }
    blocked.sort_by_key(|s| s.start);
    subtract_intervals(&day, &merge_overlapping(&blocked))
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`; both sorted by start, `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(Span::new(current_start, b.end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::conflict::check_availability;
    use crate::engine::interval::buffered_window;
    use crate::limits::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 20).unwrap()
    }

    fn approved(start: Minutes, end: Minutes) -> Reservation {
        let span = Span::new(start, end);
        let at = day().and_hms_opt(0, 0, 0).unwrap();
        Reservation {
            id: Ulid::new(),
            resource_id: "H1".into(),
            owner_id: "owner".into(),
            date: day(),
            span,
            buffered: buffered_window(span, BUFFER_MINUTES, DAY_START, DAY_END),
            duration_minutes: end - start,
            status: BookingStatus::Approved,
            purpose: None,
            attendees: 0,
            priority: Priority::Normal,
            cancellation_reason: None,
            auto_approved: false,
            created_at: at,
            updated_at: at,
        }
    }

    fn policy() -> SchedulingPolicy {
        SchedulingPolicy::default()
    }

    // ── suggest ───────────────────────────────────────────

    #[test]
    fn suggestions_skip_buffered_region() {
        // 09:00-11:00 booked; a 90-minute request cannot end after 08:16 or start before 11:44
        let existing = vec![approved(540, 660)];
        let slots = suggest("H1", day(), Span::new(690, 780), &existing, None, &policy());
        assert_eq!(
            slots,
            vec![
                Span::new(360, 450), // 06:00
                Span::new(390, 480),
                Span::new(720, 810), // 12:00
                Span::new(750, 840),
                Span::new(780, 870),
            ]
        );
    }

    #[test]
    fn suggestions_are_capped_and_ordered() {
        let slots = suggest("H1", day(), Span::new(600, 660), &[], None, &policy());
        assert_eq!(slots.len(), MAX_SUGGESTIONS);
        assert!(slots.windows(2).all(|w| w[0].start < w[1].start));
        assert!(slots.iter().all(|s| s.duration() == 60));
    }

    #[test]
    fn suggestions_never_run_past_closing() {
        // Whole day booked except the evening; a 2h request fits only up to 21:00 start
        let existing = vec![approved(360, 1150)];
        let slots = suggest("H1", day(), Span::new(1200, 1320), &existing, None, &policy());
        assert!(!slots.is_empty());
        assert!(slots.iter().all(|s| s.end <= DAY_END));
        assert!(slots.iter().all(|s| s.start >= 1150 + BUFFER_MINUTES));
        assert_eq!(slots.last().unwrap().start, 1260);
    }

    #[test]
    fn no_suggestions_when_day_is_full() {
        let existing = vec![approved(360, 1380)];
        let slots = suggest("H1", day(), Span::new(600, 660), &existing, None, &policy());
        assert!(slots.is_empty());
    }

    #[test]
    fn every_suggestion_passes_the_detector() {
        let existing = vec![
            approved(420, 480),
            approved(600, 700),
            approved(830, 900),
            approved(1100, 1200),
        ];
        for dur in [30, 45, 60, 120, 180] {
            let requested = Span::new(610, 610 + dur);
            let slots = suggest("H1", day(), requested, &existing, None, &policy());
            for s in slots {
                let again = check_availability("H1", day(), s, &existing, None, &policy());
                assert!(again.is_available, "suggested {s} rejected");
                assert_eq!(s.duration(), dur);
            }
        }
    }

    // ── free_windows ──────────────────────────────────────

    #[test]
    fn free_windows_empty_day() {
        let free = free_windows("H1", day(), &[], None, &policy());
        assert_eq!(free, vec![Span::new(DAY_START, DAY_END)]);
    }

    #[test]
    fn free_windows_punch_buffered_holes() {
        let existing = vec![approved(540, 660), approved(370, 390)];
        let free = free_windows("H1", day(), &existing, None, &policy());
        assert_eq!(free, vec![Span::new(434, 496), Span::new(704, DAY_END)]);
    }

    #[test]
    fn free_windows_merge_close_reservations() {
        // Buffered windows [496,704) and [680,850) overlap
        let existing = vec![approved(540, 660), approved(724, 806)];
        let free = free_windows("H1", day(), &existing, None, &policy());
        assert_eq!(
            free,
            vec![Span::new(DAY_START, 496), Span::new(850, DAY_END)]
        );
    }

    #[test]
    fn free_windows_agree_with_detector() {
        let existing = vec![approved(480, 540), approved(700, 790), approved(1200, 1300)];
        let free = free_windows("H1", day(), &existing, None, &policy());
        for start in (DAY_START..DAY_END - 30).step_by(11) {
            let span = Span::new(start, start + 30);
            let in_window = free.iter().any(|w| w.contains_span(&span));
            let available =
                check_availability("H1", day(), span, &existing, None, &policy()).is_available;
            assert_eq!(in_window, available, "{span}");
        }
    }

    // ── interval helpers ──────────────────────────────────

    #[test]
    fn subtract_middle_punch() {
        let result = subtract_intervals(&[Span::new(100, 300)], &[Span::new(150, 200)]);
        assert_eq!(result, vec![Span::new(100, 150), Span::new(200, 300)]);
    }

    #[test]
    fn subtract_full_overlap() {
        let result = subtract_intervals(&[Span::new(100, 200)], &[Span::new(50, 250)]);
        assert!(result.is_empty());
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let merged = merge_overlapping(&[Span::new(100, 200), Span::new(200, 300), Span::new(400, 500)]);
        assert_eq!(merged, vec![Span::new(100, 300), Span::new(400, 500)]);
    }
}
