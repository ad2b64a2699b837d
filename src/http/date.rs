//! HTTP-date formatting and parsing (RFC 9110 §5.6.7).
//!
//! Dates are always emitted as IMF-fixdate. On input the two obsolete forms
//! (RFC 850 and asctime) are accepted as well, as recipients are required to.

use chrono::{DateTime, NaiveDateTime, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC_850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Formats `date` as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use revalidate::http::date::format_http_date;
///
/// let date = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
/// assert_eq!(format_http_date(date), "Sun, 06 Nov 1994 08:49:37 GMT");
/// ```
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format(IMF_FIXDATE).to_string()
}

/// Parses an HTTP-date in any of the three permitted forms.
///
/// Returns `None` for anything else; callers treat an unparseable
/// conditional header as absent.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    [RFC_850, ASCTIME]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Drops the sub-second part of `date`; HTTP-dates carry whole seconds only.
pub fn truncate_to_seconds(date: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(date.timestamp(), 0).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap()
    }

    #[test]
    fn parses_imf_fixdate() {
        assert_eq!(
            parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"),
            Some(reference())
        );
    }

    #[test]
    fn parses_rfc_850() {
        assert_eq!(
            parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT"),
            Some(reference())
        );
    }

    #[test]
    fn parses_asctime() {
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994"), Some(reference()));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_http_date("yesterday-ish"), None);
        assert_eq!(parse_http_date(""), None);
    }

    #[test]
    fn format_then_parse_is_stable() {
        let formatted = format_http_date(reference());
        assert_eq!(parse_http_date(&formatted), Some(reference()));
    }

    #[test]
    fn truncation_drops_nanos() {
        let precise = reference() + chrono::Duration::milliseconds(750);
        assert_eq!(truncate_to_seconds(precise), reference());
    }
}
