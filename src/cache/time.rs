//! Time expressions used by `max_age`, `shared_max_age` and `expires`.
//!
//! Everything is resolved in UTC against an injected [`Clock`], and ages are
//! always rounded up to the next whole second.
//!
//! Accepted forms:
//!
//! | Form       | Examples                                             |
//! |------------|------------------------------------------------------|
//! | seconds    | `3600`, `+60`, `1.5` (truncated)                     |
//! | relative   | `+1 day`, `2 hours 30 minutes`, `tomorrow`, `now -1 week` |
//! | absolute   | `@1709294400`, `2024-03-01T12:00:00Z`, `Fri, 01 Mar 2024 12:00:00 GMT`, `2024-03-01 12:00:00`, `2024-03-01` |

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use super::directive::Age;
use crate::http::date;

/// Source of "now" for resolving relative expressions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Fortnight,
    Month,
    Year,
}

impl Unit {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "s" | "sec" | "secs" | "second" | "seconds" => Unit::Second,
            "min" | "mins" | "minute" | "minutes" => Unit::Minute,
            "h" | "hour" | "hours" => Unit::Hour,
            "day" | "days" => Unit::Day,
            "week" | "weeks" => Unit::Week,
            "fortnight" | "fortnights" => Unit::Fortnight,
            "month" | "months" => Unit::Month,
            "year" | "years" => Unit::Year,
            _ => return None,
        })
    }

    fn seconds(self) -> Option<i64> {
        match self {
            Unit::Second => Some(1),
            Unit::Minute => Some(60),
            Unit::Hour => Some(3_600),
            Unit::Day => Some(86_400),
            Unit::Week => Some(604_800),
            Unit::Fortnight => Some(1_209_600),
            Unit::Month | Unit::Year => None,
        }
    }

    fn shift(self, instant: DateTime<Utc>, amount: i64) -> Option<DateTime<Utc>> {
        if let Some(per_unit) = self.seconds() {
            let delta = TimeDelta::try_seconds(amount.checked_mul(per_unit)?)?;
            return instant.checked_add_signed(delta);
        }
        let months = match self {
            Unit::Year => amount.checked_mul(12)?,
            _ => amount,
        };
        let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
        if months >= 0 {
            instant.checked_add_months(magnitude)
        } else {
            instant.checked_sub_months(magnitude)
        }
    }
}

/// Resolves `expression` to an absolute instant.
///
/// Returns `None` when the expression is not understood.
pub fn resolve_instant(expression: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expression = expression.trim();
    if expression.is_empty() {
        return None;
    }
    relative(expression, now).or_else(|| absolute(expression))
}

/// Resolves an [`Age`] to whole seconds from `now`.
///
/// Negative results clamp to zero.
pub fn resolve_age(age: &Age, now: DateTime<Utc>) -> Option<u64> {
    let expression = match age {
        Age::Seconds(seconds) => return Some(*seconds),
        Age::Expression(expression) => expression.trim(),
    };

    if let Ok(seconds) = expression.parse::<i64>() {
        return Some(clamp(seconds, expression));
    }
    if let Ok(seconds) = expression.parse::<f64>() {
        return seconds
            .is_finite()
            .then(|| clamp(seconds.trunc() as i64, expression));
    }

    let instant = resolve_instant(expression, now)?;
    let millis = (instant - now).num_milliseconds();
    Some(clamp((millis + 999).div_euclid(1000), expression))
}

fn clamp(seconds: i64, expression: &str) -> u64 {
    u64::try_from(seconds).unwrap_or_else(|_| {
        tracing::warn!(expression, seconds, "negative cache age clamped to 0");
        0
    })
}

fn start_of_day(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
}

fn relative(expression: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = expression.to_ascii_lowercase();
    let mut tokens = lowered.split_whitespace().peekable();

    let base = match tokens.peek().copied() {
        Some("now") => Some(now),
        Some("today" | "midnight") => start_of_day(now),
        Some("tomorrow") => Unit::Day.shift(start_of_day(now)?, 1),
        Some("yesterday") => Unit::Day.shift(start_of_day(now)?, -1),
        _ => None,
    };
    let mut instant = match base {
        Some(base) => {
            tokens.next();
            base
        }
        None => now,
    };

    while let Some(token) = tokens.next() {
        let digits_at = usize::from(token.starts_with(['+', '-']));
        let split = token[digits_at..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(token.len(), |at| at + digits_at);
        let amount: i64 = token[..split].parse().ok()?;
        let unit = match &token[split..] {
            "" => tokens.next()?,
            attached => attached,
        };
        instant = Unit::parse(unit)?.shift(instant, amount)?;
    }

    Some(instant)
}

fn absolute(expression: &str) -> Option<DateTime<Utc>> {
    if let Some(timestamp) = expression.strip_prefix('@') {
        return DateTime::from_timestamp(timestamp.parse().ok()?, 0);
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(expression) {
        return Some(instant.with_timezone(&Utc));
    }
    if let Some(instant) = date::parse_http_date(expression) {
        return Some(instant);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(expression, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(expression, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn age(expression: &str) -> Option<u64> {
        resolve_age(&Age::from(expression), now())
    }

    #[test]
    fn relative_seconds() {
        assert_eq!(age("+60 seconds"), Some(60));
        assert_eq!(age("+60seconds"), Some(60));
    }

    #[test]
    fn compound_offsets() {
        assert_eq!(age("1 hour 30 minutes"), Some(5_400));
        assert_eq!(age("+1 day"), Some(86_400));
        assert_eq!(age("+2 Weeks"), Some(1_209_600));
    }

    #[test]
    fn calendar_months() {
        // March has 31 days.
        assert_eq!(age("+1 month"), Some(31 * 86_400));
        assert_eq!(
            resolve_instant("+1 year", now()),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(age("now"), Some(0));
        assert_eq!(age("tomorrow"), Some(12 * 3_600));
        assert_eq!(
            resolve_instant("yesterday", now()),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
        );
        assert_eq!(age("midnight +1 day"), Some(12 * 3_600));
    }

    #[test]
    fn numeric_strings_are_seconds() {
        assert_eq!(age("3600"), Some(3_600));
        assert_eq!(age("+60"), Some(60));
        assert_eq!(age("1.9"), Some(1));
        assert_eq!(resolve_age(&Age::Seconds(5), now()), Some(5));
    }

    #[test]
    fn past_ages_clamp_to_zero() {
        assert_eq!(age("-5 minutes"), Some(0));
        assert_eq!(age("-30"), Some(0));
    }

    #[test]
    fn sub_second_now_rounds_up() {
        let jittered = now() + TimeDelta::milliseconds(250);
        let target = Age::from("2024-03-01 12:00:10");
        assert_eq!(resolve_age(&target, jittered), Some(10));
    }

    #[test]
    fn absolute_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        for expression in [
            "2024-03-02",
            "2024-03-02 00:00:00",
            "2024-03-02T00:00:00Z",
            "2024-03-02T01:00:00+01:00",
            "Sat, 02 Mar 2024 00:00:00 GMT",
            "@1709337600",
        ] {
            assert_eq!(resolve_instant(expression, now()), Some(expected), "{expression}");
        }
    }

    #[test]
    fn garbage_is_rejected() {
        for expression in ["", "soon", "+1 fortnite", "+ day", "1 day extra", "nan", "inf"] {
            assert_eq!(age(expression), None, "{expression}");
        }
    }

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = FixedClock(now());
        assert_eq!(clock.now(), clock.now());
    }
}
