//! Contiguous integer intervals with optionally unbounded sides.

use num_bigint::BigInt;
use num_traits::One;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One closed range of arbitrary-precision integers.
///
/// A missing bound means the interval is unbounded on that side. If both
/// bounds are present, `lower <= upper` holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimpleInterval {
    lower_bound: Option<BigInt>,
    upper_bound: Option<BigInt>,
}

impl SimpleInterval {
    /// Creates the interval `[lower, upper]`
    ///
    /// # Panics
    ///
    /// Panics if `lower > upper`.
    pub fn of(lower: impl Into<BigInt>, upper: impl Into<BigInt>) -> Self {
        let lower = lower.into();
        let upper = upper.into();
        assert!(lower <= upper, "invalid interval bounds: [{lower}, {upper}]");
        Self {
            lower_bound: Some(lower),
            upper_bound: Some(upper),
        }
    }

    /// Creates the interval containing exactly one value
    pub fn singleton(value: impl Into<BigInt>) -> Self {
        let value = value.into();
        Self {
            lower_bound: Some(value.clone()),
            upper_bound: Some(value),
        }
    }

    /// Creates the interval `[lower, +inf)`
    pub fn greater_or_equal(lower: impl Into<BigInt>) -> Self {
        Self {
            lower_bound: Some(lower.into()),
            upper_bound: None,
        }
    }

    /// Creates the interval `(-inf, upper]`
    pub fn less_or_equal(upper: impl Into<BigInt>) -> Self {
        Self {
            lower_bound: None,
            upper_bound: Some(upper.into()),
        }
    }

    /// Creates the interval `(-inf, +inf)`
    pub fn infinite() -> Self {
        Self {
            lower_bound: None,
            upper_bound: None,
        }
    }

    /// The lower bound, `None` meaning unbounded
    pub fn lower_bound(&self) -> Option<&BigInt> {
        self.lower_bound.as_ref()
    }

    /// The upper bound, `None` meaning unbounded
    pub fn upper_bound(&self) -> Option<&BigInt> {
        self.upper_bound.as_ref()
    }

    /// Whether the interval has a finite lower bound
    pub fn has_lower_bound(&self) -> bool {
        self.lower_bound.is_some()
    }

    /// Whether the interval has a finite upper bound
    pub fn has_upper_bound(&self) -> bool {
        self.upper_bound.is_some()
    }

    /// Whether the interval contains exactly one value
    pub fn is_singleton(&self) -> bool {
        match (&self.lower_bound, &self.upper_bound) {
            (Some(lower), Some(upper)) => lower == upper,
            _ => false,
        }
    }

    /// The number of contained values, `None` when unbounded
    pub fn size(&self) -> Option<BigInt> {
        match (&self.lower_bound, &self.upper_bound) {
            (Some(lower), Some(upper)) => Some(upper - lower + BigInt::one()),
            _ => None,
        }
    }

    /// Whether `value` lies within the interval
    pub fn contains(&self, value: &BigInt) -> bool {
        if let Some(lower) = &self.lower_bound {
            if value < lower {
                return false;
            }
        }
        if let Some(upper) = &self.upper_bound {
            if value > upper {
                return false;
            }
        }
        true
    }

    /// Whether every value of `other` lies within this interval
    pub fn contains_interval(&self, other: &SimpleInterval) -> bool {
        let lower_ok = match (&self.lower_bound, &other.lower_bound) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(own), Some(theirs)) => own <= theirs,
        };
        let upper_ok = match (&self.upper_bound, &other.upper_bound) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(own), Some(theirs)) => own >= theirs,
        };
        lower_ok && upper_ok
    }

    /// Whether the two intervals share at least one value
    pub fn intersects_with(&self, other: &SimpleInterval) -> bool {
        !Self::strictly_left_of(self, other) && !Self::strictly_left_of(other, self)
    }

    /// Whether the two intervals overlap or are directly adjacent, so that
    /// their union is a single contiguous interval
    pub fn touches(&self, other: &SimpleInterval) -> bool {
        self.intersects_with(other)
            || Self::adjacent(self, other)
            || Self::adjacent(other, self)
    }

    fn strictly_left_of(left: &SimpleInterval, right: &SimpleInterval) -> bool {
        match (&left.upper_bound, &right.lower_bound) {
            (Some(upper), Some(lower)) => upper < lower,
            _ => false,
        }
    }

    fn adjacent(left: &SimpleInterval, right: &SimpleInterval) -> bool {
        match (&left.upper_bound, &right.lower_bound) {
            (Some(upper), Some(lower)) => upper + BigInt::one() == *lower,
            _ => false,
        }
    }

    /// The shared part of two intervals, `None` when they are disjoint
    pub fn intersection(&self, other: &SimpleInterval) -> Option<SimpleInterval> {
        if !self.intersects_with(other) {
            return None;
        }
        let lower = match (&self.lower_bound, &other.lower_bound) {
            (Some(own), Some(theirs)) => Some(own.max(theirs).clone()),
            (Some(own), None) => Some(own.clone()),
            (None, Some(theirs)) => Some(theirs.clone()),
            (None, None) => None,
        };
        let upper = match (&self.upper_bound, &other.upper_bound) {
            (Some(own), Some(theirs)) => Some(own.min(theirs).clone()),
            (Some(own), None) => Some(own.clone()),
            (None, Some(theirs)) => Some(theirs.clone()),
            (None, None) => None,
        };
        Some(SimpleInterval {
            lower_bound: lower,
            upper_bound: upper,
        })
    }

    /// The smallest interval containing both inputs
    pub fn span(&self, other: &SimpleInterval) -> SimpleInterval {
        let lower = match (&self.lower_bound, &other.lower_bound) {
            (Some(own), Some(theirs)) => Some(own.min(theirs).clone()),
            _ => None,
        };
        let upper = match (&self.upper_bound, &other.upper_bound) {
            (Some(own), Some(theirs)) => Some(own.max(theirs).clone()),
            _ => None,
        };
        SimpleInterval {
            lower_bound: lower,
            upper_bound: upper,
        }
    }

    /// Mirrors the interval at zero
    pub fn negate(&self) -> SimpleInterval {
        SimpleInterval {
            lower_bound: self.upper_bound.as_ref().map(|upper| -upper),
            upper_bound: self.lower_bound.as_ref().map(|lower| -lower),
        }
    }

    /// Drops the lower bound
    pub fn extend_to_neg_infinity(&self) -> SimpleInterval {
        SimpleInterval {
            lower_bound: None,
            upper_bound: self.upper_bound.clone(),
        }
    }

    /// Drops the upper bound
    pub fn extend_to_pos_infinity(&self) -> SimpleInterval {
        SimpleInterval {
            lower_bound: self.lower_bound.clone(),
            upper_bound: None,
        }
    }
}

impl fmt::Display for SimpleInterval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.lower_bound {
            Some(lower) => write!(f, "[{lower}, ")?,
            None => write!(f, "[-inf, ")?,
        }
        match &self.upper_bound {
            Some(upper) => write!(f, "{upper}]"),
            None => write!(f, "inf]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_and_bounds() {
        let interval = SimpleInterval::of(2, 4);
        assert_eq!(interval.lower_bound(), Some(&BigInt::from(2)));
        assert_eq!(interval.upper_bound(), Some(&BigInt::from(4)));
        assert_eq!(interval.size(), Some(BigInt::from(3)));
        assert!(!interval.is_singleton());
        assert!(SimpleInterval::singleton(7).is_singleton());
        assert!(!SimpleInterval::greater_or_equal(0).has_upper_bound());
        assert!(!SimpleInterval::infinite().has_lower_bound());
    }

    #[test]
    #[should_panic(expected = "invalid interval bounds")]
    fn inverted_bounds_rejected() {
        SimpleInterval::of(4, 2);
    }

    #[test]
    fn negation_mirrors_at_zero() {
        assert_eq!(SimpleInterval::of(2, 4).negate(), SimpleInterval::of(-4, -2));
        assert_eq!(
            SimpleInterval::greater_or_equal(1).negate(),
            SimpleInterval::less_or_equal(-1)
        );
        assert_eq!(SimpleInterval::singleton(0).negate(), SimpleInterval::singleton(0));
    }

    #[test]
    fn touching_includes_adjacency() {
        let left = SimpleInterval::of(0, 4);
        assert!(left.touches(&SimpleInterval::of(3, 8)));
        assert!(left.touches(&SimpleInterval::of(5, 8)));
        assert!(!left.touches(&SimpleInterval::of(6, 8)));
        assert!(left.intersects_with(&SimpleInterval::of(4, 8)));
        assert!(!left.intersects_with(&SimpleInterval::of(5, 8)));
    }

    #[test]
    fn intersection_and_span() {
        let a = SimpleInterval::of(0, 10);
        let b = SimpleInterval::of(5, 20);
        assert_eq!(a.intersection(&b), Some(SimpleInterval::of(5, 10)));
        assert_eq!(a.span(&b), SimpleInterval::of(0, 20));
        assert_eq!(a.intersection(&SimpleInterval::of(11, 12)), None);
        assert_eq!(
            a.intersection(&SimpleInterval::less_or_equal(3)),
            Some(SimpleInterval::of(0, 3))
        );
        assert_eq!(
            a.span(&SimpleInterval::greater_or_equal(5)),
            SimpleInterval::greater_or_equal(0)
        );
    }

    #[test]
    fn containment() {
        let outer = SimpleInterval::of(-10, 10);
        assert!(outer.contains_interval(&SimpleInterval::of(-10, 10)));
        assert!(outer.contains_interval(&SimpleInterval::singleton(0)));
        assert!(!outer.contains_interval(&SimpleInterval::of(0, 11)));
        assert!(!outer.contains_interval(&SimpleInterval::greater_or_equal(0)));
        assert!(SimpleInterval::infinite().contains_interval(&outer));
        assert!(outer.contains(&BigInt::from(-10)));
        assert!(!outer.contains(&BigInt::from(11)));
    }

    #[test]
    fn display_renders_infinities() {
        assert_eq!(SimpleInterval::of(1, 2).to_string(), "[1, 2]");
        assert_eq!(SimpleInterval::less_or_equal(-1).to_string(), "[-inf, -1]");
        assert_eq!(SimpleInterval::infinite().to_string(), "[-inf, inf]");
    }
}
