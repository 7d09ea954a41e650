use chrono::NaiveDateTime;

use crate::engine::EngineError;

/// Wall-clock timestamp, minute resolution on input.
pub type Timestamp = NaiveDateTime;

/// The only accepted timestamp layout: `YYYY-MM-DD HH:MM`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Length of the span in (fractional) hours.
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }
}

/// Parse a timestamp in the strict `YYYY-MM-DD HH:MM` layout.
///
/// chrono alone accepts unpadded fields, so the shape is checked first.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, EngineError> {
    let bytes = raw.as_bytes();
    let shape_ok = bytes.len() == 16
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            10 => *b == b' ',
            13 => *b == b':',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(EngineError::InvalidTimeFormat(raw.to_string()));
    }
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|_| EngineError::InvalidTimeFormat(raw.to_string()))
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIME_FORMAT).to_string()
}

/// Parse `start`/`end` and require `end > start`.
pub fn parse_span(start: &str, end: &str) -> Result<Span, EngineError> {
    let start = parse_timestamp(start)?;
    let end = parse_timestamp(end)?;
    if end <= start {
        return Err(EngineError::InvalidInterval {
            start: format_timestamp(&start),
            end: format_timestamp(&end),
        });
    }
    Ok(Span::new(start, end))
}

/// Validate an hourly rate: finite and non-negative.
pub fn validate_rate(rate: f64) -> Result<f64, EngineError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(rate)
    } else {
        Err(EngineError::InvalidInput(format!(
            "hourly rate must be a non-negative number, got {rate}"
        )))
    }
}

/// Parse an hourly rate from presentation-layer text.
pub fn parse_rate(raw: &str) -> Result<f64, EngineError> {
    let rate: f64 = raw.trim().parse().map_err(|_| {
        EngineError::InvalidInput(format!("hourly rate must be a number, got '{raw}'"))
    })?;
    validate_rate(rate)
}

/// A reservation of one facility. `cost` is frozen when the booking is
/// created or updated.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub user: String,
    pub span: Span,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct FacilityState {
    pub name: String,
    pub hourly_rate: f64,
    /// Creation order, used to list facilities deterministically.
    pub seq: u64,
    /// Set once the facility has been removed from the engine.
    pub retired: bool,
    /// Bookings in insertion order.
    pub bookings: Vec<Booking>,
}

impl FacilityState {
    pub fn new(name: String, seq: u64) -> Self {
        Self {
            name,
            hourly_rate: 0.0,
            seq,
            retired: false,
            bookings: Vec::new(),
        }
    }

    pub fn cost_of(&self, span: &Span) -> f64 {
        span.duration_hours() * self.hourly_rate
    }

    /// Index of the first booking made by `user`.
    pub fn position_by_user(&self, user: &str) -> Option<usize> {
        self.bookings.iter().position(|b| b.user == user)
    }

    /// Index of the first booking made by `user` starting exactly at `start`.
    pub fn position_by_user_and_start(&self, user: &str, start: &Timestamp) -> Option<usize> {
        self.bookings
            .iter()
            .position(|b| b.user == user && b.span.start == *start)
    }

    pub fn info(&self) -> FacilityInfo {
        FacilityInfo {
            name: self.name.clone(),
            hourly_rate: self.hourly_rate,
            booking_count: self.bookings.len(),
        }
    }

    pub fn booking_info(&self, booking: &Booking) -> BookingInfo {
        BookingInfo {
            facility: self.name.clone(),
            user: booking.user.clone(),
            start: booking.span.start,
            end: booking.span.end,
            cost: booking.cost,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FacilityInfo {
    pub name: String,
    pub hourly_rate: f64,
    pub booking_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingInfo {
    pub facility: String,
    pub user: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn span(start: &str, end: &str) -> Span {
        Span::new(ts(start), ts(end))
    }

    #[test]
    fn parse_timestamp_accepts_exact_layout() {
        let t = ts("2024-01-01 10:00");
        assert_eq!(format_timestamp(&t), "2024-01-01 10:00");
        let t = ts("2024-12-31 23:59");
        assert_eq!(format_timestamp(&t), "2024-12-31 23:59");
    }

    #[test]
    fn parse_timestamp_rejects_other_layouts() {
        for raw in [
            "",
            "2024-1-1 10:00",
            "2024-01-01 9:00",
            "2024-01-01T10:00",
            "2024-01-01 10:00:00",
            "2024/01/01 10:00",
            " 2024-01-01 10:00",
            "2024-01-01  10:0",
            "abcd-ef-gh ij:kl",
        ] {
            assert!(
                matches!(parse_timestamp(raw), Err(EngineError::InvalidTimeFormat(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn parse_timestamp_rejects_impossible_dates() {
        assert!(parse_timestamp("2024-02-30 10:00").is_err());
        assert!(parse_timestamp("2024-13-01 10:00").is_err());
        assert!(parse_timestamp("2024-01-01 24:00").is_err());
        assert!(parse_timestamp("2024-01-01 10:60").is_err());
        // leap day
        assert!(parse_timestamp("2024-02-29 10:00").is_ok());
    }

    #[test]
    fn parse_span_requires_end_after_start() {
        assert!(parse_span("2024-01-01 10:00", "2024-01-01 11:00").is_ok());
        assert!(matches!(
            parse_span("2024-01-01 10:00", "2024-01-01 10:00"),
            Err(EngineError::InvalidInterval { .. })
        ));
        assert!(matches!(
            parse_span("2024-01-01 11:00", "2024-01-01 10:00"),
            Err(EngineError::InvalidInterval { .. })
        ));
        // format is checked before ordering
        assert!(matches!(
            parse_span("2024-01-01 11:00", "bogus"),
            Err(EngineError::InvalidTimeFormat(_))
        ));
    }

    #[test]
    fn span_duration_hours() {
        assert_eq!(span("2024-01-01 10:00", "2024-01-01 12:30").duration_hours(), 2.5);
        assert_eq!(span("2024-01-01 23:00", "2024-01-02 01:00").duration_hours(), 2.0);
        assert_eq!(span("2024-01-01 10:00", "2024-01-01 10:15").duration_hours(), 0.25);
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = span("2024-01-01 10:00", "2024-01-01 12:00");
        assert!(a.overlaps(&span("2024-01-01 11:00", "2024-01-01 13:00")));
        assert!(a.overlaps(&span("2024-01-01 09:00", "2024-01-01 10:01")));
        assert!(a.overlaps(&span("2024-01-01 10:30", "2024-01-01 11:30")));
        assert!(a.overlaps(&span("2024-01-01 09:00", "2024-01-01 13:00")));
        assert!(a.overlaps(&a));
        assert!(!a.overlaps(&span("2024-01-01 12:00", "2024-01-01 13:00")));
        assert!(!a.overlaps(&span("2024-01-01 08:00", "2024-01-01 10:00")));
    }

    #[test]
    fn rate_validation() {
        assert_eq!(parse_rate("20").unwrap(), 20.0);
        assert_eq!(parse_rate(" 12.5 ").unwrap(), 12.5);
        assert_eq!(parse_rate("0").unwrap(), 0.0);
        assert!(matches!(parse_rate("-1"), Err(EngineError::InvalidInput(_))));
        assert!(matches!(parse_rate("twenty"), Err(EngineError::InvalidInput(_))));
        assert!(matches!(parse_rate(""), Err(EngineError::InvalidInput(_))));
        assert!(validate_rate(f64::NAN).is_err());
        assert!(validate_rate(f64::INFINITY).is_err());
    }

    #[test]
    fn facility_lookup_helpers() {
        let mut fs = FacilityState::new("Court A".into(), 0);
        fs.hourly_rate = 10.0;
        let first = span("2024-01-01 10:00", "2024-01-01 11:00");
        let second = span("2024-01-01 12:00", "2024-01-01 13:00");
        fs.bookings.push(Booking { user: "alice".into(), span: first, cost: 10.0 });
        fs.bookings.push(Booking { user: "alice".into(), span: second, cost: 10.0 });

        assert_eq!(fs.position_by_user("alice"), Some(0));
        assert_eq!(fs.position_by_user("bob"), None);
        assert_eq!(fs.position_by_user_and_start("alice", &second.start), Some(1));
        assert_eq!(fs.position_by_user_and_start("alice", &ts("2024-01-01 10:30")), None);

        let query = span("2024-01-01 10:30", "2024-01-01 12:30");
        assert_eq!(fs.cost_of(&query), 20.0);
        assert_eq!(fs.info().booking_count, 2);
    }
}
