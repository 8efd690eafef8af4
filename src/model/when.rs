//! Temporal windows: `"<start> ... <end>"` expressions with relative terms.
//!
//! A window bound is one of `past`, `future`, `now`, `now + <duration>`,
//! `now - <duration>` or an absolute UTC timestamp. An end bound may also be
//! written as `+<duration>`, meaning relative to the start bound. A trailing
//! `/ <period>` is carried through untouched.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ParseError;

const RANGE_SEPARATOR: &str = "...";
const PERIOD_SEPARATOR: char = '/';

/// One end of a temporal window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Unbounded in the past.
    Past,
    /// Unbounded in the future.
    Future,
    /// Offset from the instant the window is evaluated.
    Now(TimeDelta),
    /// Fixed UTC instant.
    Absolute(DateTime<Utc>),
}

impl Bound {
    /// Resolve to epoch milliseconds against a reference instant.
    fn resolve(self, now: DateTime<Utc>) -> i64 {
        match self {
            Self::Past => i64::MIN,
            Self::Future => i64::MAX,
            Self::Now(offset) => now
                .checked_add_signed(offset)
                .map_or(i64::MAX, |t| t.timestamp_millis()),
            Self::Absolute(at) => at.timestamp_millis(),
        }
    }

    fn parse(term: &str) -> Result<Self, String> {
        let term = term.trim();
        match term {
            "past" => return Ok(Self::Past),
            "future" => return Ok(Self::Future),
            "now" => return Ok(Self::Now(TimeDelta::zero())),
            _ => {}
        }

        if let Some(rest) = term.strip_prefix("now") {
            let rest = rest.trim_start();
            let (sign, amount) = match rest.chars().next() {
                Some('+') => (1, &rest[1..]),
                Some('-') => (-1, &rest[1..]),
                _ => return Err(format!("expected `+` or `-` after `now` in `{term}`")),
            };
            let delta = parse_duration(amount.trim())?;
            return Ok(Self::Now(if sign < 0 { -delta } else { delta }));
        }

        parse_timestamp(term).map(Self::Absolute)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Past => f.write_str("past"),
            Self::Future => f.write_str("future"),
            Self::Now(offset) if offset.is_zero() => f.write_str("now"),
            Self::Now(offset) if *offset < TimeDelta::zero() => {
                write!(f, "now - {}", format_duration(-*offset))
            }
            Self::Now(offset) => write!(f, "now + {}", format_duration(*offset)),
            Self::Absolute(at) => f.write_str(&format_timestamp(*at)),
        }
    }
}

/// A temporal window attached to every capability and specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct When {
    start: Bound,
    end: Bound,
    period: Option<String>,
}

impl When {
    /// Build a window from explicit bounds.
    #[must_use]
    pub const fn new(start: Bound, end: Bound) -> Self {
        Self {
            start,
            end,
            period: None,
        }
    }

    /// The open-ended `now ... future` window used by most capabilities.
    #[must_use]
    pub fn now_to_future() -> Self {
        Self::new(Bound::Now(TimeDelta::zero()), Bound::Future)
    }

    /// A window starting now and lasting `length`.
    #[must_use]
    pub fn now_for(length: Duration) -> Self {
        let delta = TimeDelta::from_std(length).unwrap_or(TimeDelta::MAX);
        Self::new(Bound::Now(TimeDelta::zero()), Bound::Now(delta))
    }

    /// Start bound.
    #[must_use]
    pub const fn start(&self) -> Bound {
        self.start
    }

    /// End bound.
    #[must_use]
    pub const fn end(&self) -> Bound {
        self.end
    }

    /// Repetition period, if one was given.
    #[must_use]
    pub fn period(&self) -> Option<&str> {
        self.period.as_deref()
    }

    /// Whether this window lies entirely within `outer` when both are
    /// evaluated at `now`.
    #[must_use]
    pub fn contained_in_at(&self, outer: &Self, now: DateTime<Utc>) -> bool {
        let (start, end) = (self.start.resolve(now), self.end.resolve(now));
        start <= end && start >= outer.start.resolve(now) && end <= outer.end.resolve(now)
    }

    /// Delays from `now` until the start and the end of the window.
    ///
    /// Bounds already in the past yield a zero delay; an unbounded end
    /// yields `None`.
    #[must_use]
    pub fn timer_delays(&self, now: DateTime<Utc>) -> (Duration, Option<Duration>) {
        let now_ms = now.timestamp_millis();
        let until = |bound: Bound| {
            let target = bound.resolve(now);
            Duration::from_millis(u64::try_from(target.saturating_sub(now_ms)).unwrap_or(0))
        };
        let end = match self.end {
            Bound::Future => None,
            bound => Some(until(bound)),
        };
        (until(self.start), end)
    }
}

impl Default for When {
    fn default() -> Self {
        Self::now_to_future()
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)?;
        } else {
            write!(f, "{} {RANGE_SEPARATOR} {}", self.start, self.end)?;
        }
        if let Some(period) = &self.period {
            write!(f, " {PERIOD_SEPARATOR} {period}")?;
        }
        Ok(())
    }
}

impl FromStr for When {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (range, period) = match input.split_once(PERIOD_SEPARATOR) {
            Some((range, period)) => {
                let period = period.trim();
                parse_duration(period).map_err(|reason| ParseError::when(input, reason))?;
                (range, Some(period.to_string()))
            }
            None => (input, None),
        };

        let (start, end) = match range.split_once(RANGE_SEPARATOR) {
            Some((start, end)) => {
                let start = Bound::parse(start).map_err(|reason| ParseError::when(input, reason))?;
                let end = match end.trim().strip_prefix('+') {
                    Some(relative) => {
                        let delta = parse_duration(relative.trim())
                            .map_err(|reason| ParseError::when(input, reason))?;
                        shift(start, delta).ok_or_else(|| {
                            ParseError::when(input, "relative end needs a `now` or absolute start")
                        })?
                    }
                    None => Bound::parse(end).map_err(|reason| ParseError::when(input, reason))?,
                };
                (start, end)
            }
            None => {
                let single = Bound::parse(range).map_err(|reason| ParseError::when(input, reason))?;
                (single, single)
            }
        };

        if matches!(start, Bound::Future) || matches!(end, Bound::Past) {
            return Err(ParseError::when(input, "window bounds are reversed"));
        }

        Ok(Self { start, end, period })
    }
}

impl Serialize for When {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for When {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn shift(bound: Bound, delta: TimeDelta) -> Option<Bound> {
    match bound {
        Bound::Now(offset) => offset.checked_add(&delta).map(Bound::Now),
        Bound::Absolute(at) => at.checked_add_signed(delta).map(Bound::Absolute),
        Bound::Past | Bound::Future => None,
    }
}

/// Parse `<n><unit>` sequences such as `5s`, `1h30m` or `250ms`.
fn parse_duration(input: &str) -> Result<TimeDelta, String> {
    if input.is_empty() {
        return Err("empty duration".into());
    }

    let mut total = TimeDelta::zero();
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return Err(format!("expected a number in duration `{input}`"));
        }
        let amount: i64 = rest[..digits]
            .parse()
            .map_err(|e| format!("bad number in duration `{input}`: {e}"))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(char::is_ascii_alphabetic).count();
        let part = match &rest[..unit_len] {
            "ms" => TimeDelta::try_milliseconds(amount),
            "s" => TimeDelta::try_seconds(amount),
            "m" => TimeDelta::try_minutes(amount),
            "h" => TimeDelta::try_hours(amount),
            "d" => TimeDelta::try_days(amount),
            unit => return Err(format!("unknown duration unit `{unit}` in `{input}`")),
        }
        .ok_or_else(|| format!("duration `{input}` out of range"))?;
        rest = &rest[unit_len..];

        total = total
            .checked_add(&part)
            .ok_or_else(|| format!("duration `{input}` out of range"))?;
    }
    Ok(total)
}

fn format_duration(delta: TimeDelta) -> String {
    let mut ms = delta.num_milliseconds();
    if ms == 0 {
        return "0s".into();
    }

    let mut out = String::new();
    for (unit, size) in [("d", 86_400_000), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)] {
        if ms >= size {
            out.push_str(&format!("{}{unit}", ms / size));
            ms %= size;
        }
    }
    if ms > 0 {
        out.push_str(&format!("{ms}ms"));
    }
    out
}

pub(crate) fn parse_timestamp(term: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(term) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(term, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(term, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("unrecognised time term `{term}`"))
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    if at.timestamp_subsec_millis() == 0 {
        at.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }
}
