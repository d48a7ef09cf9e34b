use crate::model::Minutes;

/// Mandatory gap kept free around every active reservation.
pub const BUFFER_MINUTES: Minutes = 44;

/// 06:00, halls open.
pub const DAY_START: Minutes = 6 * 60;
/// 23:00, halls close.
pub const DAY_END: Minutes = 23 * 60;

pub const MIN_BOOKING_MINUTES: Minutes = 30;

// Suggestion scan: every half hour from opening up to 22:00 inclusive.
pub const SUGGESTION_STEP_MINUTES: Minutes = 30;
pub const LAST_SUGGESTION_START: Minutes = 22 * 60;
pub const MAX_SUGGESTIONS: usize = 5;

/// Sweeps closer together than this are skipped.
pub const SWEEP_MIN_INTERVAL_SECS: i64 = 5 * 60;

pub const MAX_PURPOSE_LEN: usize = 500;
pub const MAX_ID_LEN: usize = 128;
