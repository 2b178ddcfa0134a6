use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// US month/day/year, the historical feed's convention
const US_FORMAT: &str = "%m/%d/%Y";
/// ISO year-month-day
const ISO_FORMAT: &str = "%Y-%m-%d";

/// Date-time layouts tried by the permissive fallback
const GENERIC_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
];

/// Date-only layouts tried by the permissive fallback
const GENERIC_DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%Y%m%d",
    "%m/%d/%y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y-%m",
];

/// Parse one raw date cell.
///
/// Tries US `MM/DD/YYYY` first, then ISO `YYYY-MM-DD`, then a permissive set of
/// timestamp and textual layouts. Anything that survives none of them is `None`.
///
/// chrono's `%Y` also matches one to three digits, so a `%Y` layout only counts
/// when it yields a four-digit year. "01/15/18" therefore falls through to the
/// two-digit `%m/%d/%y` layout instead of landing in year 18.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    parse_full_year(value, US_FORMAT)
        .or_else(|| parse_full_year(value, ISO_FORMAT))
        .or_else(|| parse_generic(value))
}

/// Normalize a column of raw date cells, preserving length and order
pub fn normalize_dates(values: &[Option<String>]) -> Vec<Option<NaiveDate>> {
    values
        .iter()
        .map(|value| value.as_deref().and_then(normalize_date))
        .collect()
}

fn has_full_year(date: &NaiveDate) -> bool {
    (1000..=9999).contains(&date.year())
}

fn parse_full_year(value: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, format)
        .ok()
        .filter(has_full_year)
}

fn parse_generic(value: &str) -> Option<NaiveDate> {
    // Offsets are kept as written so the calendar date is the one the source recorded
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local().date());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_local().date());
    }

    for format in GENERIC_DATETIME_FORMATS {
        if let Some(date) = NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|dt| dt.date())
            .filter(has_full_year)
        {
            return Some(date);
        }
    }

    for format in GENERIC_DATE_FORMATS {
        if *format == "%Y-%m" {
            // Year-month only resolves to the first of the month
            if let Some(date) = parse_full_year(&format!("{value}-01"), ISO_FORMAT) {
                return Some(date);
            }
            continue;
        }
        if let Some(date) = parse_full_year(value, format) {
            return Some(date);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_us_format() {
        assert_eq!(normalize_date("01/15/2018"), Some(ymd(2018, 1, 15)));
        assert_eq!(normalize_date("12/31/1999"), Some(ymd(1999, 12, 31)));
    }

    #[test]
    fn test_two_digit_year_us_date() {
        assert_eq!(normalize_date("01/15/18"), Some(ymd(2018, 1, 15)));
        assert_eq!(normalize_date("12/31/99"), Some(ymd(1999, 12, 31)));
    }

    #[test]
    fn test_short_year_never_lands_in_antiquity() {
        assert_eq!(normalize_date("18-01-15"), None);
        assert_eq!(normalize_date("0018-01-15"), None);
        assert_eq!(normalize_date("1/2/018"), None);
    }

    #[test]
    fn test_iso_format() {
        assert_eq!(normalize_date("2021-06-02"), Some(ymd(2021, 6, 2)));
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        assert_eq!(normalize_date("  03/04/2020 \t"), Some(ymd(2020, 3, 4)));
        assert_eq!(normalize_date("\n2020-03-04  "), Some(ymd(2020, 3, 4)));
    }

    #[test]
    fn test_us_format_wins_over_day_first_reading() {
        // 03/04 is March 4th, never April 3rd
        assert_eq!(normalize_date("03/04/2020"), Some(ymd(2020, 3, 4)));
    }

    #[test]
    fn test_socrata_floating_timestamp() {
        assert_eq!(normalize_date("2021-06-02T00:00:00.000"), Some(ymd(2021, 6, 2)));
        assert_eq!(normalize_date("2021-06-02T13:45:10"), Some(ymd(2021, 6, 2)));
    }

    #[test]
    fn test_offset_timestamp_keeps_written_date() {
        assert_eq!(normalize_date("2021-06-02T23:30:00-05:00"), Some(ymd(2021, 6, 2)));
        assert_eq!(normalize_date("2021-06-02T00:00:00Z"), Some(ymd(2021, 6, 2)));
    }

    #[test]
    fn test_us_date_with_time() {
        assert_eq!(normalize_date("01/15/2018 12:00:00 AM"), Some(ymd(2018, 1, 15)));
        assert_eq!(normalize_date("01/15/2018 17:05:00"), Some(ymd(2018, 1, 15)));
    }

    #[test]
    fn test_textual_month() {
        assert_eq!(normalize_date("January 15, 2018"), Some(ymd(2018, 1, 15)));
        assert_eq!(normalize_date("15 Jan 2018"), Some(ymd(2018, 1, 15)));
    }

    #[test]
    fn test_unparseable_is_missing() {
        assert_eq!(normalize_date("not a date"), None);
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("   "), None);
        assert_eq!(normalize_date("13/45/2018"), None);
    }

    #[test]
    fn test_column_preserves_length_and_order() {
        let column = vec![
            Some("01/15/2018".to_string()),
            None,
            Some("garbage".to_string()),
            Some("2019-02-28".to_string()),
        ];
        let parsed = normalize_dates(&column);
        assert_eq!(
            parsed,
            vec![Some(ymd(2018, 1, 15)), None, None, Some(ymd(2019, 2, 28))]
        );
    }
}
