//! Civil date and timestamp arithmetic.
//!
//! Dates are calendar days since the Unix epoch with UTC semantics;
//! timestamps are fractional seconds since the epoch. Conversions between
//! day counts and `(year, month, day)` use the standard era-based civil
//! calendar algorithms, so the full proleptic Gregorian range is supported.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Month names used by the formatters.
pub const MONTH_NAMES: [&str; 12] = [
    "januaro",
    "februaro",
    "marto",
    "aprilo",
    "majo",
    "junio",
    "julio",
    "aŭgusto",
    "septembro",
    "oktobro",
    "novembro",
    "decembro",
];

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// A calendar date: days since 1970-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    days: i64,
}

impl Date {
    pub fn from_days(days: i64) -> Self {
        Self { days }
    }

    pub fn days(self) -> i64 {
        self.days
    }

    pub fn from_ymd(year: i64, month: i64, day: i64) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        let month = month as u32;
        if day < 1 || day > days_in_month(year, month) as i64 {
            return None;
        }
        Some(Self {
            days: days_from_civil(year, month, day as u32),
        })
    }

    pub fn ymd(self) -> (i64, u32, u32) {
        civil_from_days(self.days)
    }

    pub fn year(self) -> i64 {
        self.ymd().0
    }

    pub fn month(self) -> u32 {
        self.ymd().1
    }

    pub fn day(self) -> u32 {
        self.ymd().2
    }

    /// ISO weekday: 1 = Monday … 7 = Sunday.
    pub fn weekday(self) -> u32 {
        ((self.days + 3).rem_euclid(7) + 1) as u32
    }

    /// Parse an ISO-8601 `YYYY-MM-DD` calendar string.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '-');
        let year: i64 = parts.next()?.parse().ok()?;
        let month: i64 = parts.next()?.parse().ok()?;
        let day: i64 = parts.next()?.parse().ok()?;
        Self::from_ymd(year, month, day)
    }

    /// Add calendar months, clamping the day to the target month's length.
    pub fn add_months(self, months: i64) -> Self {
        let (year, month, day) = self.ymd();
        let total = year * 12 + (month as i64 - 1) + months;
        let new_year = total.div_euclid(12);
        let new_month = (total.rem_euclid(12) + 1) as u32;
        let new_day = (day).min(days_in_month(new_year, new_month));
        Self {
            days: days_from_civil(new_year, new_month, new_day),
        }
    }

    /// Today in UTC, from the system clock.
    pub fn today() -> Self {
        let secs = Timestamp::now().secs();
        Self {
            days: (secs.floor() as i64).div_euclid(86_400),
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (y, m, d) = self.ymd();
        write!(f, "{y:04}-{m:02}-{d:02}")
    }
}

pub fn is_leap_year(year: i64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// Days since the epoch for a civil date (era-based algorithm).
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (if month > 2 { month - 3 } else { month + 9 }) as i64;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Civil date for a day count since the epoch (era-based algorithm).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// An instant in time: fractional seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp {
    secs: f64,
}

impl Timestamp {
    pub fn from_secs(secs: f64) -> Self {
        Self { secs }
    }

    pub fn secs(self) -> f64 {
        self.secs
    }

    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self { secs }
    }

    /// Decompose into UTC civil fields: (year, month, day, hour, min, sec).
    pub fn civil_utc(self) -> (i64, u32, u32, u32, u32, u32) {
        let whole = self.secs.floor() as i64;
        let days = whole.div_euclid(86_400);
        let rem = whole.rem_euclid(86_400);
        let (y, m, d) = civil_from_days(days);
        (
            y,
            m,
            d,
            (rem / 3600) as u32,
            (rem % 3600 / 60) as u32,
            (rem % 60) as u32,
        )
    }

    /// Rebuild an instant from UTC civil fields, keeping fractional seconds.
    pub fn from_civil_utc(
        year: i64,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
        frac: f64,
    ) -> Self {
        let days = days_from_civil(year, month, day);
        let secs =
            days as f64 * 86_400.0 + hour as f64 * 3600.0 + min as f64 * 60.0 + sec as f64 + frac;
        Self { secs }
    }

    /// Fractional part of the second, in `[0, 1)`.
    pub fn subsec(self) -> f64 {
        self.secs - self.secs.floor()
    }

    /// Shift by a signed minute offset (positive = east of UTC).
    pub fn to_local(self, tz_minutes: f64) -> Self {
        Self {
            secs: self.secs + tz_minutes * 60.0,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (y, m, d, hh, mm, ss) = self.civil_utc();
        let millis = (self.subsec() * 1000.0).round() as u32;
        if millis == 0 {
            write!(f, "{y:04}-{m:02}-{d:02}T{hh:02}:{mm:02}:{ss:02}Z")
        } else {
            write!(f, "{y:04}-{m:02}-{d:02}T{hh:02}:{mm:02}:{ss:02}.{millis:03}Z")
        }
    }
}

/// Parse an ISO-8601 instant: `YYYY-MM-DD[THH:MM[:SS[.fff]]][Z|±HH:MM]`.
pub fn parse_timestamp(input: &str) -> Option<Timestamp> {
    let s = input.trim();
    let (date_part, rest) = match s.find('T') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    };
    let date = Date::parse(date_part)?;
    if rest.is_empty() {
        return Some(Timestamp::from_secs(date.days() as f64 * 86_400.0));
    }

    let (time_part, offset_minutes) = split_offset(rest)?;
    let mut fields = time_part.splitn(3, ':');
    let hour: u32 = fields.next()?.parse().ok()?;
    let min: u32 = fields.next()?.parse().ok()?;
    let (sec, frac) = match fields.next() {
        None => (0u32, 0.0),
        Some(sec_str) => {
            let secs: f64 = sec_str.parse().ok()?;
            if !(0.0..60.0).contains(&secs) {
                return None;
            }
            (secs.floor() as u32, secs - secs.floor())
        }
    };
    if hour > 23 || min > 59 {
        return None;
    }

    let local = date.days() as f64 * 86_400.0
        + hour as f64 * 3600.0
        + min as f64 * 60.0
        + sec as f64
        + frac;
    Some(Timestamp::from_secs(local - offset_minutes * 60.0))
}

/// Split a trailing `Z` or `±HH:MM` offset off a time string, returning the
/// offset in minutes. No suffix means UTC.
fn split_offset(rest: &str) -> Option<(&str, f64)> {
    if let Some(stripped) = rest.strip_suffix('Z') {
        return Some((stripped, 0.0));
    }
    if let Some(idx) = rest.rfind(['+', '-']) {
        let (time, offset) = (&rest[..idx], &rest[idx..]);
        let sign = if offset.starts_with('-') { -1.0 } else { 1.0 };
        let body = &offset[1..];
        let (hh, mm) = body.split_once(':')?;
        let hours: f64 = hh.parse().ok()?;
        let minutes: f64 = mm.parse().ok()?;
        return Some((time, sign * (hours * 60.0 + minutes)));
    }
    Some((rest, 0.0))
}

// ---------------------------------------------------------------------------
// Token formatting
// ---------------------------------------------------------------------------

/// Substitute format tokens, longest token first; unrecognized text passes
/// through verbatim.
fn format_tokens(fmt: &str, tokens: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut rest = fmt;
    'outer: while !rest.is_empty() {
        for (token, replacement) in tokens {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        let Some(ch) = rest.chars().next() else {
            break;
        };
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

pub fn format_date(fmt: &str, date: Date) -> String {
    let (y, m, d) = date.ymd();
    format_tokens(fmt, &date_tokens(y, m, d))
}

pub fn format_timestamp(fmt: &str, ts: Timestamp) -> String {
    let (y, m, d, hh, mm, ss) = ts.civil_utc();
    let mut tokens = date_tokens(y, m, d);
    tokens.extend([
        ("HH", format!("{hh:02}")),
        ("H", hh.to_string()),
        ("mm", format!("{mm:02}")),
        ("m", mm.to_string()),
        ("ss", format!("{ss:02}")),
        ("s", ss.to_string()),
    ]);
    // Longest tokens must win over their single-letter forms.
    tokens.sort_by_key(|(t, _)| std::cmp::Reverse(t.len()));
    format_tokens(fmt, &tokens)
}

fn date_tokens(y: i64, m: u32, d: u32) -> Vec<(&'static str, String)> {
    vec![
        ("YYYY", format!("{y:04}")),
        ("MMMM", MONTH_NAMES[(m - 1) as usize].to_string()),
        ("YY", format!("{:02}", y.rem_euclid(100))),
        ("MM", format!("{m:02}")),
        ("DD", format!("{d:02}")),
        ("M", m.to_string()),
        ("D", d.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_round_trip() {
        for &(y, m, d) in &[
            (1970, 1, 1),
            (2000, 2, 29),
            (2019, 5, 3),
            (1899, 12, 31),
            (2038, 1, 19),
        ] {
            let date = Date::from_ymd(y, m, d).expect("valid date");
            assert_eq!(date.ymd(), (y, m as u32, d as u32));
        }
    }

    #[test]
    fn epoch_is_a_thursday() {
        assert_eq!(Date::from_days(0).weekday(), 4);
    }

    #[test]
    fn parse_and_display_round_trip() {
        let date = Date::parse("2019-05-03").expect("parses");
        assert_eq!(date.to_string(), "2019-05-03");
        assert!(Date::parse("2019-02-30").is_none());
        assert!(Date::parse("2019-13-01").is_none());
    }

    #[test]
    fn add_months_clamps_the_day() {
        let date = Date::parse("2019-01-31").expect("parses");
        assert_eq!(date.add_months(1).to_string(), "2019-02-28");
        assert_eq!(date.add_months(-2).to_string(), "2018-11-30");
    }

    #[test]
    fn timestamp_parse_handles_offsets() {
        let utc = parse_timestamp("2020-06-01T12:00:00Z").expect("parses");
        let east = parse_timestamp("2020-06-01T14:00:00+02:00").expect("parses");
        assert_eq!(utc.secs(), east.secs());

        let date_only = parse_timestamp("2020-06-01").expect("parses");
        assert_eq!(date_only.civil_utc(), (2020, 6, 1, 0, 0, 0));
    }

    #[test]
    fn timestamp_display_is_iso() {
        let ts = parse_timestamp("2020-06-01T12:34:56Z").expect("parses");
        assert_eq!(ts.to_string(), "2020-06-01T12:34:56Z");
    }

    #[test]
    fn format_tokens_use_month_names() {
        let date = Date::parse("2021-08-09").expect("parses");
        assert_eq!(format_date("D MMMM YYYY", date), "9 aŭgusto 2021");
        assert_eq!(format_date("DD/MM/YY", date), "09/08/21");
    }

    #[test]
    fn format_timestamp_tokens() {
        let ts = parse_timestamp("2021-08-09T07:05:03Z").expect("parses");
        assert_eq!(format_timestamp("YYYY-MM-DD HH:mm:ss", ts), "2021-08-09 07:05:03");
    }
}
