use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::SignedDuration;

/// A point on a [`TimeSource`](crate::TimeSource) timeline, in nanoseconds since that source's
/// origin.
///
/// Timestamps taken from different sources (or from a source before and after a virtual clock
/// was installed) are not meaningfully comparable; nothing enforces this, callers are expected
/// to keep them apart.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Offsets by a signed duration, returning `None` when the result would leave the `u64`
    /// nanosecond range.
    pub const fn checked_add_signed(self, d: SignedDuration) -> Option<Self> {
        let ns = d.as_nanos();
        let shifted = if ns >= 0 {
            self.0.checked_add(ns as u64)
        } else {
            self.0.checked_sub(ns.unsigned_abs())
        };
        match shifted {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Offsets by a signed duration, clamping at the ends of the `u64` nanosecond range.
    pub const fn saturating_add_signed(self, d: SignedDuration) -> Self {
        let ns = d.as_nanos();
        if ns >= 0 {
            Self(self.0.saturating_add(ns as u64))
        } else {
            Self(self.0.saturating_sub(ns.unsigned_abs()))
        }
    }

    /// Signed elapsed time from `earlier` to `self`; negative when `earlier` is actually later.
    /// Saturates at the ends of the [`SignedDuration`] range.
    pub fn duration_since(self, earlier: Timestamp) -> SignedDuration {
        let diff = self.0 as i128 - earlier.0 as i128;
        SignedDuration::from_nanos(diff.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Wall-clock nanoseconds elapsed since `origin`, saturating (u64 nanoseconds is ~584
    /// years, so saturation is theoretical).
    pub(crate) fn since(origin: Instant) -> Self {
        Self(origin.elapsed().as_nanos().min(u64::MAX as u128) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_offsets() {
        let t = Timestamp::from_nanos(100);
        assert_eq!(
            t.checked_add_signed(SignedDuration::from_nanos(-100)),
            Some(Timestamp::from_nanos(0))
        );
        assert_eq!(t.checked_add_signed(SignedDuration::from_nanos(-101)), None);
        assert_eq!(
            t.saturating_add_signed(SignedDuration::from_nanos(-101)),
            Timestamp::from_nanos(0)
        );
        assert_eq!(
            Timestamp::from_nanos(u64::MAX).saturating_add_signed(SignedDuration::from_nanos(1)),
            Timestamp::from_nanos(u64::MAX)
        );
    }

    #[test]
    fn duration_since_is_signed() {
        let a = Timestamp::from_nanos(250);
        let b = Timestamp::from_nanos(1_000);
        assert_eq!(b.duration_since(a), SignedDuration::from_nanos(750));
        assert_eq!(a.duration_since(b), SignedDuration::from_nanos(-750));
    }
}
