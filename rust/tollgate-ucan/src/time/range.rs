//! Time range for UCAN validity windows.

use super::timestamp::Timestamp;
use std::{
    fmt,
    ops::{Bound, RangeBounds},
};

/// A time range representing the intersection of all validity windows
/// in a UCAN delegation chain.
///
/// `not_before` is the latest `nbf` across all delegations (inclusive lower bound).
/// `expiration` is the earliest `exp` across all delegations (exclusive upper bound:
/// a delegation is no longer valid at the second it expires).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Earliest time this range is valid (latest `nbf` in the chain).
    pub not_before: Bound<Timestamp>,

    /// First time this range is no longer valid (earliest `exp` in the chain).
    pub expiration: Bound<Timestamp>,
}

impl TimeRange {
    /// An unbounded time range (no constraints).
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            not_before: Bound::Unbounded,
            expiration: Bound::Unbounded,
        }
    }

    /// Creates a time range from optional `nbf` and `exp` fields.
    #[must_use]
    pub const fn new(not_before: Option<Timestamp>, expiration: Option<Timestamp>) -> Self {
        Self {
            not_before: match not_before {
                Some(t) => Bound::Included(t),
                None => Bound::Unbounded,
            },
            expiration: match expiration {
                Some(t) => Bound::Excluded(t),
                None => Bound::Unbounded,
            },
        }
    }

    /// Returns `true` if this range is non-empty (a valid time exists within it).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match (self.not_before, self.expiration) {
            (Bound::Included(nbf), Bound::Excluded(exp)) => nbf < exp,
            (Bound::Included(nbf), Bound::Included(exp)) => nbf <= exp,
            (Bound::Excluded(nbf), Bound::Included(exp) | Bound::Excluded(exp)) => nbf < exp,
            _ => true,
        }
    }

    /// The earliest `exp` in the range, if any.
    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        match self.expiration {
            Bound::Included(t) | Bound::Excluded(t) => Some(t),
            Bound::Unbounded => None,
        }
    }

    /// Compute the intersection of two time ranges.
    ///
    /// The resulting `not_before` is the later of the two lower bounds,
    /// and the resulting `expiration` is the earlier of the two upper bounds.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        let not_before = match (self.not_before, other.not_before) {
            (Bound::Included(a), Bound::Included(b)) => Bound::Included(a.max(b)),
            (Bound::Excluded(a), Bound::Excluded(b)) => Bound::Excluded(a.max(b)),
            (Bound::Excluded(a), Bound::Included(b)) | (Bound::Included(b), Bound::Excluded(a)) => {
                if a >= b {
                    Bound::Excluded(a)
                } else {
                    Bound::Included(b)
                }
            }
            (bound, Bound::Unbounded) | (Bound::Unbounded, bound) => bound,
        };
        let expiration = match (self.expiration, other.expiration) {
            (Bound::Included(a), Bound::Included(b)) => Bound::Included(a.min(b)),
            (Bound::Excluded(a), Bound::Excluded(b)) => Bound::Excluded(a.min(b)),
            (Bound::Excluded(a), Bound::Included(b)) | (Bound::Included(b), Bound::Excluded(a)) => {
                if a <= b {
                    Bound::Excluded(a)
                } else {
                    Bound::Included(b)
                }
            }
            (bound, Bound::Unbounded) | (Bound::Unbounded, bound) => bound,
        };
        Self {
            not_before,
            expiration,
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RangeBounds<Timestamp> for TimeRange {
    fn start_bound(&self) -> Bound<&Timestamp> {
        self.not_before.as_ref()
    }

    fn end_bound(&self) -> Bound<&Timestamp> {
        self.expiration.as_ref()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.not_before {
            Bound::Included(nbf) | Bound::Excluded(nbf) => write!(f, "{}", nbf.to_unix())?,
            Bound::Unbounded => {}
        }
        write!(f, "..")?;
        match self.expiration {
            Bound::Included(exp) => write!(f, "={}", exp.to_unix()),
            Bound::Excluded(exp) => write!(f, "{}", exp.to_unix()),
            Bound::Unbounded => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_unix(secs)
    }

    #[test]
    fn it_excludes_the_expiration_second() {
        let range = TimeRange::new(Some(ts(10)), Some(ts(20)));
        assert!(!range.contains(&ts(9)));
        assert!(range.contains(&ts(10)));
        assert!(range.contains(&ts(19)));
        assert!(!range.contains(&ts(20)));
    }

    #[test]
    fn it_intersects_to_the_narrowest_window() {
        let outer = TimeRange::new(Some(ts(10)), Some(ts(100)));
        let inner = TimeRange::new(Some(ts(20)), Some(ts(50)));
        let range = outer.intersect(inner);
        assert_eq!(range, TimeRange::new(Some(ts(20)), Some(ts(50))));
        assert_eq!(range.expires_at(), Some(ts(50)));
        assert_eq!(range.to_string(), "20..50");
    }

    #[test]
    fn it_treats_missing_bounds_as_open() {
        let open = TimeRange::unbounded();
        let bounded = TimeRange::new(None, Some(ts(5)));
        assert_eq!(open.intersect(bounded), bounded);
        assert!(open.contains(&ts(u64::MAX)));
    }

    #[test]
    fn it_detects_empty_ranges() {
        let range = TimeRange::new(Some(ts(30)), None).intersect(TimeRange::new(None, Some(ts(30))));
        assert!(!range.is_valid());
    }
}
