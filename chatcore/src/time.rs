use chrono::{DateTime, Days, TimeZone};
use std::fmt::Display;

/// Renders a message timestamp relative to `now` for conversation lists.
///
/// Same day: `"03:07 PM"`. Previous day: `"Yesterday at 03:07 PM"`.
/// Anything else: `"May 1, 2024, 03:07 PM"`.
pub fn format_timestamp<Tz>(ts: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let day = ts.date_naive();
    let today = now.date_naive();
    if day == today {
        ts.format("%I:%M %p").to_string()
    } else if today.checked_sub_days(Days::new(1)) == Some(day) {
        ts.format("Yesterday at %I:%M %p").to_string()
    } else {
        ts.format("%b %-d, %Y, %I:%M %p").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_format_timestamp_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap();

        let today = Utc.with_ymd_and_hms(2024, 5, 2, 15, 7, 0).unwrap();
        assert_eq!(format_timestamp(&today, &now), "03:07 PM");

        let yesterday = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        assert_eq!(format_timestamp(&yesterday, &now), "Yesterday at 11:59 PM");

        let older = Utc.with_ymd_and_hms(2024, 4, 30, 8, 5, 0).unwrap();
        assert_eq!(format_timestamp(&older, &now), "Apr 30, 2024, 08:05 AM");
    }

    #[test]
    fn test_format_timestamp_across_year_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 10, 0).unwrap();
        let new_years_eve = Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap();
        assert_eq!(
            format_timestamp(&new_years_eve, &now),
            "Yesterday at 12:00 PM"
        );
    }
}
