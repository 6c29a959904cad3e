use time::{
    format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime, Time,
    UtcOffset,
};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    to_primitive_utc(OffsetDateTime::now_utc())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

pub(crate) fn format_optional(value: Option<PrimitiveDateTime>) -> Option<String> {
    value.map(format_primitive)
}

/// Bounds `[start, end)` in UTC of the calendar day containing `now` at `offset`.
pub(crate) fn local_day_bounds(
    now: PrimitiveDateTime,
    offset: UtcOffset,
) -> (PrimitiveDateTime, PrimitiveDateTime) {
    let local = now.assume_utc().to_offset(offset);
    let midnight = local.replace_time(Time::MIDNIGHT);
    let start = to_primitive_utc(midnight);
    (start, start + Duration::days(1))
}

/// Whole seconds elapsed from `start` to `end`, never negative.
pub(crate) fn elapsed_seconds(start: PrimitiveDateTime, end: PrimitiveDateTime) -> i64 {
    (end - start).whole_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn format_primitive_outputs_utc_z() {
        let value = datetime!(2025-01-02 10:20:30);
        assert_eq!(format_primitive(value), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn local_day_bounds_in_utc() {
        let (start, end) = local_day_bounds(datetime!(2025-03-10 15:00:00), UtcOffset::UTC);
        assert_eq!(start, datetime!(2025-03-10 00:00:00));
        assert_eq!(end, datetime!(2025-03-11 00:00:00));
    }

    #[test]
    fn local_day_bounds_shift_with_offset() {
        let offset = UtcOffset::from_hms(-5, 0, 0).unwrap();
        // 03:00 UTC is still the previous evening at -05:00.
        let (start, end) = local_day_bounds(datetime!(2025-03-10 03:00:00), offset);
        assert_eq!(start, datetime!(2025-03-09 05:00:00));
        assert_eq!(end, datetime!(2025-03-10 05:00:00));
    }

    #[test]
    fn elapsed_seconds_clamps_negative() {
        let start = datetime!(2025-01-01 10:00:00);
        assert_eq!(elapsed_seconds(start, datetime!(2025-01-01 10:01:30)), 90);
        assert_eq!(elapsed_seconds(start, datetime!(2025-01-01 09:00:00)), 0);
    }
}
