use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MIN: i64 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MIN;

/// Signed elapsed time with nanosecond resolution and a representable range of roughly ±292
/// years.
///
/// Negative durations are meaningful throughout the timer API: arming a timer with a negative
/// delay is the documented "never fire" state, not an error.
///
/// Values parse from and format to a compact text form (`"100ms"`, `"1h30m"`, `"-1.5s"`), which
/// is also the serde representation, so durations can sit directly in configuration files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignedDuration(i64);

impl SignedDuration {
    pub const ZERO: Self = Self(0);
    pub const MIN: Self = Self(i64::MIN);
    pub const MAX: Self = Self(i64::MAX);

    pub const fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }

    /// Saturates at the ends of the representable range, as do the other unit constructors.
    pub const fn from_micros(us: i64) -> Self {
        Self(us.saturating_mul(NANOS_PER_MICRO))
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms.saturating_mul(NANOS_PER_MILLI))
    }

    pub const fn from_secs(s: i64) -> Self {
        Self(s.saturating_mul(NANOS_PER_SEC))
    }

    pub const fn from_mins(m: i64) -> Self {
        Self(m.saturating_mul(NANOS_PER_MIN))
    }

    pub const fn from_hours(h: i64) -> Self {
        Self(h.saturating_mul(NANOS_PER_HOUR))
    }

    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Whole milliseconds, truncated toward zero (as are the other unit accessors).
    pub const fn as_millis(&self) -> i64 {
        self.0 / NANOS_PER_MILLI
    }

    pub const fn as_secs(&self) -> i64 {
        self.0 / NANOS_PER_SEC
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Absolute value, saturating at [`SignedDuration::MAX`].
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Converts to an unsigned [`std::time::Duration`]; `None` when negative.
    pub const fn to_std(self) -> Option<std::time::Duration> {
        if self.0 < 0 {
            None
        } else {
            Some(std::time::Duration::from_nanos(self.0 as u64))
        }
    }

    /// Rounds to the nearest multiple of `multiple`, half away from zero, preserving sign.
    ///
    /// A zero or negative `multiple` returns the value unchanged. Rounding up past
    /// [`SignedDuration::MAX`] saturates.
    pub fn round_to(self, multiple: SignedDuration) -> SignedDuration {
        if multiple.0 <= 0 {
            return self;
        }
        let r = multiple.0 as u64;
        let mut v = self.0.unsigned_abs();
        let m = v % r;
        if m + m < r {
            v -= m;
        } else {
            v = v.saturating_add(r - m);
        }
        let v = v.min(i64::MAX as u64) as i64;
        Self(if self.0 < 0 { -v } else { v })
    }
}

impl From<std::time::Duration> for SignedDuration {
    /// Saturates at [`SignedDuration::MAX`] (~292 years).
    fn from(d: std::time::Duration) -> Self {
        Self(d.as_nanos().min(i64::MAX as u128) as i64)
    }
}

impl std::ops::Add for SignedDuration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.checked_add(rhs.0).expect("duration overflow"))
    }
}

impl std::ops::Sub for SignedDuration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.checked_sub(rhs.0).expect("duration overflow"))
    }
}

impl std::ops::Neg for SignedDuration {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.checked_neg().expect("duration overflow"))
    }
}

/// Failure to parse a [`SignedDuration`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { input: String, unit: String },
    #[error("duration {0:?} out of range")]
    OutOfRange(String),
}

fn unit_nanos(unit: &str) -> Option<i64> {
    Some(match unit {
        "ns" => 1,
        "us" | "\u{b5}s" | "\u{3bc}s" => NANOS_PER_MICRO,
        "ms" => NANOS_PER_MILLI,
        "s" => NANOS_PER_SEC,
        "m" => NANOS_PER_MIN,
        "h" => NANOS_PER_HOUR,
        _ => return None,
    })
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    s.split_at(end)
}

impl FromStr for SignedDuration {
    type Err = ParseDurationError;

    /// Parses `[+-]? (<decimal-number> <unit>)+` with units `ns`, `us`/`µs`, `ms`, `s`, `m`,
    /// `h`; the bare strings `0`, `+0` and `-0` are accepted without a unit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s;
        let mut neg = false;
        if let Some(r) = rest.strip_prefix('-') {
            neg = true;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('+') {
            rest = r;
        }
        if rest == "0" {
            return Ok(Self::ZERO);
        }
        if rest.is_empty() {
            return Err(ParseDurationError::Invalid(s.to_owned()));
        }

        let mut total: i128 = 0;
        while !rest.is_empty() {
            let (int_digits, after_int) = split_digits(rest);
            let (frac_digits, after_num) = match after_int.strip_prefix('.') {
                Some(r) => split_digits(r),
                None => ("", after_int),
            };
            if int_digits.is_empty() && frac_digits.is_empty() {
                return Err(ParseDurationError::Invalid(s.to_owned()));
            }

            let unit_end = after_num
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(after_num.len());
            let (unit, tail) = after_num.split_at(unit_end);
            if unit.is_empty() {
                return Err(ParseDurationError::MissingUnit(s.to_owned()));
            }
            let scale = unit_nanos(unit).ok_or_else(|| ParseDurationError::UnknownUnit {
                input: s.to_owned(),
                unit: unit.to_owned(),
            })?;

            let int: u64 = if int_digits.is_empty() {
                0
            } else {
                int_digits
                    .parse()
                    .map_err(|_| ParseDurationError::OutOfRange(s.to_owned()))?
            };
            total += int as i128 * scale as i128;

            // Fraction digits beyond nanosecond precision cannot change the value; cap them so
            // the divisor below stays in u128 range.
            let frac_digits = &frac_digits[..frac_digits.len().min(18)];
            if !frac_digits.is_empty() {
                let frac: u128 = frac_digits.parse().expect("ascii digits");
                let divisor = 10u128.pow(frac_digits.len() as u32);
                total += (frac * scale as u128 / divisor) as i128;
            }

            let limit = i64::MAX as i128 + if neg { 1 } else { 0 };
            if total > limit {
                return Err(ParseDurationError::OutOfRange(s.to_owned()));
            }
            rest = tail;
        }

        let signed = if neg { -total } else { total };
        Ok(Self(signed as i64))
    }
}

/// Writes `v / scale` followed by the non-zero fractional digits of `v % scale`.
fn fmt_scaled(f: &mut fmt::Formatter<'_>, v: u64, scale: u64) -> fmt::Result {
    write!(f, "{}", v / scale)?;
    let frac = v % scale;
    if frac != 0 {
        let width = scale.ilog10() as usize;
        let digits = format!("{frac:0width$}");
        write!(f, ".{}", digits.trim_end_matches('0'))?;
    }
    Ok(())
}

impl fmt::Display for SignedDuration {
    /// The inverse of [`FromStr`]: `"0s"`, sub-second values in `ns`/`µs`/`ms`, larger values as
    /// `h`/`m`/`s` components. `Display` then `FromStr` round-trips exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0s");
        }
        if self.0 < 0 {
            f.write_str("-")?;
        }
        let v = self.0.unsigned_abs();
        if v < NANOS_PER_SEC as u64 {
            let (scale, unit) = if v < NANOS_PER_MICRO as u64 {
                (1, "ns")
            } else if v < NANOS_PER_MILLI as u64 {
                (NANOS_PER_MICRO as u64, "\u{b5}s")
            } else {
                (NANOS_PER_MILLI as u64, "ms")
            };
            fmt_scaled(f, v, scale)?;
            return f.write_str(unit);
        }
        let secs = v / NANOS_PER_SEC as u64;
        let hours = secs / 3600;
        let mins = secs % 3600 / 60;
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || mins > 0 {
            write!(f, "{mins}m")?;
        }
        fmt_scaled(f, v % NANOS_PER_MIN as u64, NANOS_PER_SEC as u64)?;
        f.write_str("s")
    }
}

impl Serialize for SignedDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SignedDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = SignedDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string such as \"1h30m\" or \"-250ms\"")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
                s.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(DurationVisitor)
    }
}
