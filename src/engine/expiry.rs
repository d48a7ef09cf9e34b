use chrono::NaiveDateTime;

use crate::model::{BookingStatus, Reservation};

/// An approved booking whose end has passed.
pub fn is_completed(reservation: &Reservation, now: NaiveDateTime) -> bool {
    reservation.status == BookingStatus::Approved && now > reservation.ends_at()
}

/// Status to display; never written back.
pub fn effective_status(reservation: &Reservation, now: NaiveDateTime) -> BookingStatus {
    if is_completed(reservation, now) {
        BookingStatus::Completed
    } else {
        reservation.status
    }
}

/// Mark every finished approved booking completed. Returns the number moved.
pub fn sweep(reservations: &mut [Reservation], now: NaiveDateTime) -> usize {
    let mut moved = 0;
    for r in reservations.iter_mut().filter(|r| is_completed(r, now)) {
        r.status = BookingStatus::Completed;
        r.updated_at = now;
        moved += 1;
    }
    moved
}
