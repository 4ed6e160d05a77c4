//! Normalized unions of disjoint intervals, the lattice elements of the
//! value domain.

use crate::interval::SimpleInterval;
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A finite union of integer intervals in normal form.
///
/// The member intervals are sorted ascending, pairwise disjoint and never
/// touching, so every value set has exactly one representation and structural
/// equality coincides with semantic equality. The empty union is the
/// unsatisfiable bottom element, the single fully unbounded interval is top.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompoundInterval {
    intervals: Vec<SimpleInterval>,
}

impl CompoundInterval {
    /// The empty value set
    pub fn bottom() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    /// The set of all integers
    pub fn top() -> Self {
        Self {
            intervals: vec![SimpleInterval::infinite()],
        }
    }

    /// The set containing exactly the values of one interval
    pub fn of(interval: SimpleInterval) -> Self {
        Self {
            intervals: vec![interval],
        }
    }

    /// The set containing exactly one value
    pub fn singleton(value: impl Into<BigInt>) -> Self {
        Self::of(SimpleInterval::singleton(value))
    }

    /// Builds the normal form of an arbitrary collection of intervals
    pub fn from_intervals(intervals: impl IntoIterator<Item = SimpleInterval>) -> Self {
        let mut parts: Vec<SimpleInterval> = intervals.into_iter().collect();
        parts.sort();
        let mut normalized: Vec<SimpleInterval> = Vec::new();
        for part in parts {
            match normalized.last_mut() {
                Some(last) if last.touches(&part) => *last = last.span(&part),
                _ => normalized.push(part),
            }
        }
        Self {
            intervals: normalized,
        }
    }

    /// The three-valued encoding of "false"
    pub fn logical_false() -> Self {
        Self::singleton(0)
    }

    /// The three-valued encoding of "true": every value except zero
    pub fn logical_true() -> Self {
        Self::logical_false().invert()
    }

    /// The definite three-valued encoding of a known truth value
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::logical_true()
        } else {
            Self::logical_false()
        }
    }

    /// The member intervals in normal form
    pub fn intervals(&self) -> &[SimpleInterval] {
        &self.intervals
    }

    /// Whether this is the empty set
    pub fn is_bottom(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Whether this is the set of all integers
    pub fn is_top(&self) -> bool {
        self.intervals.len() == 1
            && !self.intervals[0].has_lower_bound()
            && !self.intervals[0].has_upper_bound()
    }

    /// Whether the set contains exactly one value
    pub fn is_singleton(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_singleton()
    }

    /// The single contained value, if there is exactly one
    pub fn value(&self) -> Option<&BigInt> {
        if self.is_singleton() {
            self.intervals[0].lower_bound()
        } else {
            None
        }
    }

    /// The smallest contained value, `None` when empty or unbounded below
    pub fn lower_bound(&self) -> Option<&BigInt> {
        self.intervals.first().and_then(SimpleInterval::lower_bound)
    }

    /// The largest contained value, `None` when empty or unbounded above
    pub fn upper_bound(&self) -> Option<&BigInt> {
        self.intervals.last().and_then(SimpleInterval::upper_bound)
    }

    /// Whether the set is non-empty and bounded below
    pub fn has_lower_bound(&self) -> bool {
        !self.is_bottom() && self.intervals[0].has_lower_bound()
    }

    /// Whether the set is non-empty and bounded above
    pub fn has_upper_bound(&self) -> bool {
        !self.is_bottom() && self.intervals[self.intervals.len() - 1].has_upper_bound()
    }

    /// Whether `value` is a member
    pub fn contains_value(&self, value: &BigInt) -> bool {
        self.intervals.iter().any(|interval| interval.contains(value))
    }

    /// Whether every member of `other` is also a member of this set
    pub fn contains(&self, other: &CompoundInterval) -> bool {
        other.intervals.iter().all(|theirs| {
            self.intervals
                .iter()
                .any(|ours| ours.contains_interval(theirs))
        })
    }

    /// Whether the two sets share at least one value
    pub fn intersects_with(&self, other: &CompoundInterval) -> bool {
        self.intervals.iter().any(|ours| {
            other
                .intervals
                .iter()
                .any(|theirs| ours.intersects_with(theirs))
        })
    }

    /// Whether zero is a member
    pub fn contains_zero(&self) -> bool {
        self.contains_value(&BigInt::zero())
    }

    /// Whether any member is negative
    pub fn contains_negative(&self) -> bool {
        self.intervals.iter().any(|interval| match interval.lower_bound() {
            None => true,
            Some(lower) => lower.is_negative(),
        })
    }

    /// Whether any member is positive
    pub fn contains_positive(&self) -> bool {
        self.intervals.iter().any(|interval| match interval.upper_bound() {
            None => true,
            Some(upper) => upper.is_positive(),
        })
    }

    /// Whether the three-valued encoding is definitely true
    pub fn is_definitely_true(&self) -> bool {
        !self.is_bottom() && !self.contains_zero()
    }

    /// Whether the three-valued encoding is definitely false
    pub fn is_definitely_false(&self) -> bool {
        self.value().map(BigInt::is_zero).unwrap_or(false)
    }

    /// The least upper bound of the two sets
    pub fn union_with(&self, other: &CompoundInterval) -> CompoundInterval {
        Self::from_intervals(
            self.intervals
                .iter()
                .chain(other.intervals.iter())
                .cloned(),
        )
    }

    /// The greatest lower bound of the two sets
    pub fn intersect_with(&self, other: &CompoundInterval) -> CompoundInterval {
        let mut parts = Vec::new();
        for ours in &self.intervals {
            for theirs in &other.intervals {
                if let Some(shared) = ours.intersection(theirs) {
                    parts.push(shared);
                }
            }
        }
        Self::from_intervals(parts)
    }

    /// The complement within the full integer range
    pub fn invert(&self) -> CompoundInterval {
        if self.is_bottom() {
            return Self::top();
        }
        let mut gaps = Vec::new();
        if let Some(first_lower) = self.intervals[0].lower_bound() {
            gaps.push(SimpleInterval::less_or_equal(first_lower - BigInt::one()));
        }
        for pair in self.intervals.windows(2) {
            if let (Some(upper), Some(lower)) = (pair[0].upper_bound(), pair[1].lower_bound()) {
                gaps.push(SimpleInterval::of(
                    upper + BigInt::one(),
                    lower - BigInt::one(),
                ));
            }
        }
        if let Some(last_upper) = self.intervals[self.intervals.len() - 1].upper_bound() {
            gaps.push(SimpleInterval::greater_or_equal(last_upper + BigInt::one()));
        }
        Self { intervals: gaps }
    }

    /// The smallest single interval covering the whole set, `None` when empty
    pub fn span(&self) -> Option<SimpleInterval> {
        match (self.intervals.first(), self.intervals.last()) {
            (Some(first), Some(last)) => Some(first.span(last)),
            _ => None,
        }
    }

    /// Mirrors the value set at zero
    pub fn negate(&self) -> CompoundInterval {
        Self::from_intervals(self.intervals.iter().map(SimpleInterval::negate))
    }

    /// Drops the lower bound of the lowest member
    pub fn extend_to_neg_infinity(&self) -> CompoundInterval {
        match self.intervals.split_first() {
            None => self.clone(),
            Some((first, rest)) => {
                let mut intervals = Vec::with_capacity(self.intervals.len());
                intervals.push(first.extend_to_neg_infinity());
                intervals.extend_from_slice(rest);
                Self { intervals }
            }
        }
    }

    /// Drops the upper bound of the highest member
    pub fn extend_to_pos_infinity(&self) -> CompoundInterval {
        match self.intervals.split_last() {
            None => self.clone(),
            Some((last, rest)) => {
                let mut intervals = Vec::with_capacity(self.intervals.len());
                intervals.extend_from_slice(rest);
                intervals.push(last.extend_to_pos_infinity());
                Self { intervals }
            }
        }
    }
}

impl fmt::Display for CompoundInterval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_bottom() {
            return f.write_str("{}");
        }
        f.write_str("{")?;
        for (index, interval) in self.intervals.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            interval.fmt(f)?;
        }
        f.write_str("}")
    }
}
