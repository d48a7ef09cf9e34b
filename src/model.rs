use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minute of the local day (0 = midnight).
pub type Minutes = i32;

/// Half-open interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minutes {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Pending and approved bookings hold their slot; everything else is inert.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }

    /// Whether the owner may still edit a booking in this state. Cancelling
    /// additionally requires `is_active`.
    pub fn is_editable(self) -> bool {
        !matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A stored hall booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: String,
    pub owner_id: String,
    pub date: NaiveDate,
    pub span: Span,
    /// `span` widened by the buffer and clamped to opening hours.
    pub buffered: Span,
    pub duration_minutes: Minutes,
    pub status: BookingStatus,
    pub purpose: Option<String>,
    pub attendees: u32,
    pub priority: Priority,
    pub cancellation_reason: Option<String>,
    pub auto_approved: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Local wall-clock instant at which the booking ends.
    pub fn ends_at(&self) -> NaiveDateTime {
        let hour = (self.span.end / 60) as u32;
        let minute = (self.span.end % 60) as u32;
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
        self.date.and_time(time)
    }
}

/// Input to `create_booking`. Scheduling fields are optional so a missing
/// value can be reported instead of failing at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub resource_id: Option<String>,
    pub date: Option<NaiveDate>,
    /// `HH:MM`, 24-hour.
    pub start_time: Option<String>,
    /// `HH:MM`, 24-hour.
    pub end_time: Option<String>,
    pub purpose: Option<String>,
    #[serde(default)]
    pub attendees: u32,
    #[serde(default)]
    pub priority: Priority,
}

/// Partial update applied by `update_booking`; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPatch {
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub purpose: Option<String>,
    pub attendees: Option<u32>,
    pub priority: Option<Priority>,
}

impl BookingPatch {
    pub fn touches_schedule(&self) -> bool {
        self.date.is_some() || self.start_time.is_some() || self.end_time.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityResult {
    pub is_available: bool,
    /// Empty iff `is_available`.
    pub conflicting_reservations: Vec<Reservation>,
    pub suggested_slots: Vec<Span>,
    pub next_available_slot: Option<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingEventKind {
    Created,
    Approved,
    Rejected,
    Cancelled,
}

/// Lifecycle notification handed to the notifier after a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub reservation_id: Ulid,
    pub owner_id: String,
    pub resource_id: String,
}

impl BookingEvent {
    pub fn new(kind: BookingEventKind, reservation: &Reservation) -> Self {
        Self {
            kind,
            reservation_id: reservation.id,
            owner_id: reservation.owner_id.clone(),
            resource_id: reservation.resource_id.clone(),
        }
    }

    /// JSON body for downstream mail/push senders.
    pub fn payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Full snapshot after a create or an update.
    ReservationRecorded(Reservation),
    StatusChanged {
        id: Ulid,
        status: BookingStatus,
        reason: Option<String>,
        at: NaiveDateTime,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: BookingStatus) -> Reservation {
        let at = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Reservation {
            id: Ulid::new(),
            resource_id: "H1".into(),
            owner_id: "u1".into(),
            date: NaiveDate::from_ymd_opt(2025, 7, 20).unwrap(),
            span: Span::new(540, 660),
            buffered: Span::new(496, 704),
            duration_minutes: 120,
            status,
            purpose: None,
            attendees: 0,
            priority: Priority::Normal,
            cancellation_reason: None,
            auto_approved: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert_eq!(a.duration(), 100);
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(100, 400);
        assert!(outer.contains_span(&Span::new(150, 300)));
        assert!(outer.contains_span(&outer));
        assert!(!outer.contains_span(&Span::new(50, 200)));
    }

    #[test]
    fn span_display() {
        assert_eq!(Span::new(540, 660).to_string(), "09:00-11:00");
        assert_eq!(Span::new(364, 1380).to_string(), "06:04-23:00");
    }

    #[test]
    fn status_classes() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Approved.is_active());
        assert!(!BookingStatus::Completed.is_active());
        assert!(BookingStatus::Rejected.is_terminal());
        assert!(!BookingStatus::Approved.is_terminal());
        assert!(BookingStatus::Approved.is_editable());
        assert!(!BookingStatus::Cancelled.is_editable());
        assert!(!BookingStatus::Completed.is_editable());
    }

    #[test]
    fn ends_at_combines_date_and_end() {
        let r = sample(BookingStatus::Approved);
        assert_eq!(
            r.ends_at(),
            NaiveDate::from_ymd_opt(2025, 7, 20)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn event_payload_is_json() {
        let r = sample(BookingStatus::Pending);
        let event = BookingEvent::new(BookingEventKind::Created, &r);
        let value: serde_json::Value = serde_json::from_str(&event.payload()).unwrap();
        assert_eq!(value["kind"], "created");
        assert_eq!(value["resource_id"], "H1");
        assert_eq!(value["owner_id"], "u1");
    }

    #[test]
    fn wal_event_bincode_roundtrip() {
        let event = Event::ReservationRecorded(sample(BookingStatus::Approved));
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
