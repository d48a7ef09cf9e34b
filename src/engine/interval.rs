use crate::model::{Minutes, Span};

use super::EngineError;

/// Parse a 24-hour `HH:MM` string into minute-of-day.
pub fn parse_hhmm(s: &str) -> Result<Minutes, EngineError> {
    let bad = || EngineError::validation(format!("invalid time {s:?}, expected HH:MM"));
    let (h, m) = s.split_once(':').ok_or_else(bad)?;
    if h.len() != 2 || m.len() != 2 {
        return Err(bad());
    }
    if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let hours: Minutes = h.parse().map_err(|_| bad())?;
    let minutes: Minutes = m.parse().map_err(|_| bad())?;
    if hours > 23 || minutes > 59 {
        return Err(bad());
    }
    Ok(hours * 60 + minutes)
}

pub fn format_hhmm(minutes: Minutes) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Callers validate `end > start` first.
pub fn duration(start: Minutes, end: Minutes) -> Minutes {
    end - start
}

/// Widen `span` by `buffer` on both sides, clamped to `[day_floor, day_ceil]`.
pub fn buffered_window(span: Span, buffer: Minutes, day_floor: Minutes, day_ceil: Minutes) -> Span {
    Span::new(
        (span.start - buffer).max(day_floor),
        (span.end + buffer).min(day_ceil),
    )
}
