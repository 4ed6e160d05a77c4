//! Type-aware arithmetic, bitwise and comparison operators over compound
//! intervals, with exact wraparound handling and overflow reporting.

use crate::bitvector::{BitVectorInfo, TypeInfo};
use crate::compound::CompoundInterval;
use crate::interval::SimpleInterval;
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::cmp::min;
use std::fmt;
use std::sync::Arc;

/// Receives a notification each time a signed operation leaves its legal
/// range while wraparound is forbidden.
///
/// Implementations must not block; the notification is fire-and-forget and
/// carries no control-flow meaning for the arithmetic itself.
pub trait OverflowEventHandler: Send + Sync {
    /// Called once per offending operation
    fn signed_overflow(&self);
}

/// Handler that discards all overflow notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreOverflows;

impl OverflowEventHandler for IgnoreOverflows {
    fn signed_overflow(&self) {}
}

/// Creates the per-type interval managers of one analysis run and carries
/// the wraparound policy they share.
#[derive(Clone)]
pub struct CompoundIntervalManagerFactory {
    allow_signed_wrap_around: bool,
    overflow_event_handler: Arc<dyn OverflowEventHandler>,
}

impl CompoundIntervalManagerFactory {
    /// Creates a factory with the given wraparound policy and overflow sink
    pub fn new(
        allow_signed_wrap_around: bool,
        overflow_event_handler: Arc<dyn OverflowEventHandler>,
    ) -> Self {
        Self {
            allow_signed_wrap_around,
            overflow_event_handler,
        }
    }

    /// Whether signed operations may silently wrap
    pub fn allows_signed_wrap_around(&self) -> bool {
        self.allow_signed_wrap_around
    }

    /// The same policy reporting to a different overflow sink
    pub fn with_handler(&self, overflow_event_handler: Arc<dyn OverflowEventHandler>) -> Self {
        Self {
            allow_signed_wrap_around: self.allow_signed_wrap_around,
            overflow_event_handler,
        }
    }

    /// The overflow sink notifications currently go to
    pub fn overflow_event_handler(&self) -> &Arc<dyn OverflowEventHandler> {
        &self.overflow_event_handler
    }

    /// Creates the operator table for one type
    pub fn create_manager(&self, type_info: TypeInfo) -> CompoundIntervalManager {
        CompoundIntervalManager {
            type_info,
            allow_signed_wrap_around: self.allow_signed_wrap_around,
            overflow_event_handler: Arc::clone(&self.overflow_event_handler),
        }
    }
}

impl Default for CompoundIntervalManagerFactory {
    fn default() -> Self {
        Self {
            allow_signed_wrap_around: false,
            overflow_event_handler: Arc::new(IgnoreOverflows),
        }
    }
}

impl fmt::Debug for CompoundIntervalManagerFactory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompoundIntervalManagerFactory")
            .field("allow_signed_wrap_around", &self.allow_signed_wrap_around)
            .finish()
    }
}

impl PartialEq for CompoundIntervalManagerFactory {
    fn eq(&self, other: &Self) -> bool {
        self.allow_signed_wrap_around == other.allow_signed_wrap_around
    }
}

impl Eq for CompoundIntervalManagerFactory {}

/// The operator table for one type.
///
/// Binary operators are defined by lifting a per-interval operator over
/// every pair of member intervals and unioning the results, short-circuiting
/// to the type's full range the moment the accumulator reaches it. Operands
/// are first mapped into the type's legal range, so the per-interval
/// operators always see bounded inputs for bit-vector types. Operators on
/// floating-point types never produce anything more precise than "any value".
#[derive(Clone)]
pub struct CompoundIntervalManager {
    type_info: TypeInfo,
    allow_signed_wrap_around: bool,
    overflow_event_handler: Arc<dyn OverflowEventHandler>,
}

impl fmt::Debug for CompoundIntervalManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompoundIntervalManager")
            .field("type_info", &self.type_info)
            .field("allow_signed_wrap_around", &self.allow_signed_wrap_around)
            .finish()
    }
}

impl PartialEq for CompoundIntervalManager {
    fn eq(&self, other: &Self) -> bool {
        self.type_info == other.type_info
            && self.allow_signed_wrap_around == other.allow_signed_wrap_around
    }
}

impl Eq for CompoundIntervalManager {}

impl CompoundIntervalManager {
    /// The type this manager operates on
    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    /// Every value a variable of this type can legally hold
    pub fn all_possible_values(&self) -> CompoundInterval {
        self.type_info.all_possible_values()
    }

    /// The unsatisfiable value set
    pub fn bottom(&self) -> CompoundInterval {
        CompoundInterval::bottom()
    }

    /// Maps a value set of a possibly different type into this type
    pub fn cast(&self, from: TypeInfo, value: &CompoundInterval) -> CompoundInterval {
        if value.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        if from.bit_vector().is_none() {
            return CompoundInterval::of(info.range());
        }
        self.normalized(&info, value)
    }

    /// The least upper bound within this type
    pub fn union(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        match self.type_info.bit_vector() {
            None => {
                if a.is_bottom() && b.is_bottom() {
                    CompoundInterval::bottom()
                } else {
                    CompoundInterval::top()
                }
            }
            Some(info) => {
                let info = *info;
                self.normalized(&info, a).union_with(&self.normalized(&info, b))
            }
        }
    }

    /// The greatest lower bound within this type
    pub fn intersect(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        match self.type_info.bit_vector() {
            None => {
                if a.is_bottom() || b.is_bottom() {
                    CompoundInterval::bottom()
                } else {
                    CompoundInterval::top()
                }
            }
            Some(info) => {
                let info = *info;
                self.normalized(&info, a).intersect_with(&self.normalized(&info, b))
            }
        }
    }

    /// The complement within this type's legal range
    pub fn invert(&self, a: &CompoundInterval) -> CompoundInterval {
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        CompoundInterval::of(info.range()).intersect_with(&a.invert())
    }

    /// Negation with wraparound handling
    pub fn negate(&self, a: &CompoundInterval) -> CompoundInterval {
        if a.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let full = CompoundInterval::of(info.range());
        let mut result = CompoundInterval::bottom();
        for interval in a.intervals() {
            result = result.union_with(&self.handle_overflow(&info, interval.negate()));
            if result == full {
                return result;
            }
        }
        result
    }

    /// Addition with wraparound handling
    pub fn add(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        self.lift_binary(a, b, |info, x, y| self.add_intervals(info, x, y))
    }

    /// Multiplication with wraparound handling
    pub fn multiply(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        self.lift_binary(a, b, |info, x, y| self.multiply_intervals(info, x, y))
    }

    /// Truncated division; divisor values of zero are excluded
    pub fn divide(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        match self.nonzero_divisor(b) {
            None => CompoundInterval::bottom(),
            Some(divisor) => {
                self.lift_binary(a, &divisor, |info, x, d| self.divide_intervals(info, x, d))
            }
        }
    }

    /// Truncated remainder; divisor values of zero are excluded
    pub fn modulo(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        match self.nonzero_divisor(b) {
            None => CompoundInterval::bottom(),
            Some(divisor) => {
                self.lift_binary(a, &divisor, |info, x, d| self.modulo_intervals(info, x, d))
            }
        }
    }

    /// Left shift with wraparound handling; negative shift distances yield
    /// the full range
    pub fn shift_left(&self, a: &CompoundInterval, shift: &CompoundInterval) -> CompoundInterval {
        self.lift_binary(a, shift, |info, x, s| self.shift_left_intervals(info, x, s))
    }

    /// Arithmetic right shift, rounding towards negative infinity
    pub fn shift_right(&self, a: &CompoundInterval, shift: &CompoundInterval) -> CompoundInterval {
        self.lift_binary(a, shift, |info, x, s| self.shift_right_intervals(info, x, s))
    }

    /// Bitwise and.
    ///
    /// Exact only when both operands are singletons; a non-negative singleton
    /// mask on either side bounds the result into `[0, mask]`, everything
    /// else is the full range.
    pub fn binary_and(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        if a.is_bottom() || b.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let b = self.normalized(&info, b);
        if let (Some(x), Some(y)) = (a.value(), b.value()) {
            return CompoundInterval::singleton(x & y);
        }
        for mask in [a.value(), b.value()].into_iter().flatten() {
            if !mask.is_negative() {
                return CompoundInterval::of(SimpleInterval::of(BigInt::zero(), mask.clone()));
            }
        }
        CompoundInterval::of(info.range())
    }

    /// Bitwise or.
    ///
    /// Exact only when both operands are singletons; a singleton zero on
    /// either side is the identity, everything else is the full range.
    pub fn binary_or(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        if a.is_bottom() || b.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let b = self.normalized(&info, b);
        if let (Some(x), Some(y)) = (a.value(), b.value()) {
            return CompoundInterval::singleton(x | y);
        }
        if a.value().map(BigInt::is_zero).unwrap_or(false) {
            return b;
        }
        if b.value().map(BigInt::is_zero).unwrap_or(false) {
            return a;
        }
        CompoundInterval::of(info.range())
    }

    /// Bitwise xor, exact only when both operands are singletons
    pub fn binary_xor(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        if a.is_bottom() || b.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let b = self.normalized(&info, b);
        if let (Some(x), Some(y)) = (a.value(), b.value()) {
            return CompoundInterval::singleton(x ^ y);
        }
        CompoundInterval::of(info.range())
    }

    /// Three-valued equality derived from the operand value sets
    pub fn equal(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        if a.is_bottom() || b.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let b = self.normalized(&info, b);
        if !a.intersects_with(&b) {
            return CompoundInterval::logical_false();
        }
        if a.is_singleton() && a == b {
            return CompoundInterval::logical_true();
        }
        CompoundInterval::top()
    }

    /// Three-valued strict comparison derived from the extreme bounds
    pub fn less_than(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        if a.is_bottom() || b.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let b = self.normalized(&info, b);
        if let (Some(a_upper), Some(b_lower)) = (a.upper_bound(), b.lower_bound()) {
            if a_upper < b_lower {
                return CompoundInterval::logical_true();
            }
        }
        if let (Some(a_lower), Some(b_upper)) = (a.lower_bound(), b.upper_bound()) {
            if a_lower >= b_upper {
                return CompoundInterval::logical_false();
            }
        }
        CompoundInterval::top()
    }

    /// Three-valued non-strict comparison derived from the extreme bounds
    pub fn less_or_equal(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        if a.is_bottom() || b.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let b = self.normalized(&info, b);
        if let (Some(a_upper), Some(b_lower)) = (a.upper_bound(), b.lower_bound()) {
            if a_upper <= b_lower {
                return CompoundInterval::logical_true();
            }
        }
        if let (Some(a_lower), Some(b_upper)) = (a.lower_bound(), b.upper_bound()) {
            if a_lower > b_upper {
                return CompoundInterval::logical_false();
            }
        }
        CompoundInterval::top()
    }

    /// Three-valued strict comparison, operands swapped
    pub fn greater_than(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        self.less_than(b, a)
    }

    /// Three-valued non-strict comparison, operands swapped
    pub fn greater_or_equal(&self, a: &CompoundInterval, b: &CompoundInterval) -> CompoundInterval {
        self.less_or_equal(b, a)
    }

    fn nonzero_divisor(&self, b: &CompoundInterval) -> Option<CompoundInterval> {
        if b.is_bottom() {
            return None;
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return Some(b.clone()),
        };
        // map into the legal range first: an out-of-range divisor can land
        // on zero only after normalization
        let divisor = self
            .normalized(&info, b)
            .intersect_with(&CompoundInterval::singleton(0).invert());
        if divisor.is_bottom() {
            None
        } else {
            Some(divisor)
        }
    }

    fn lift_binary<F>(&self, a: &CompoundInterval, b: &CompoundInterval, op: F) -> CompoundInterval
    where
        F: Fn(&BitVectorInfo, &SimpleInterval, &SimpleInterval) -> CompoundInterval,
    {
        if a.is_bottom() || b.is_bottom() {
            return CompoundInterval::bottom();
        }
        let info = match self.type_info.bit_vector() {
            Some(info) => *info,
            None => return CompoundInterval::top(),
        };
        let a = self.normalized(&info, a);
        let b = self.normalized(&info, b);
        let full = CompoundInterval::of(info.range());
        let mut result = CompoundInterval::bottom();
        for x in a.intervals() {
            for y in b.intervals() {
                result = result.union_with(&op(&info, x, y));
                if result == full {
                    return result;
                }
            }
        }
        result
    }

    /// Maps every member interval into the legal range of `info`, applying
    /// the silent cast semantics
    fn normalized(&self, info: &BitVectorInfo, value: &CompoundInterval) -> CompoundInterval {
        let mut result = CompoundInterval::bottom();
        for interval in value.intervals() {
            result = result.union_with(&self.cast_interval(info, interval));
        }
        result
    }

    /// Cast mapping for one interval: identity when in range, a uniform
    /// shift by a multiple of the range size when the shifted interval still
    /// fits, the full range otherwise. Never reports overflow.
    fn cast_interval(&self, info: &BitVectorInfo, interval: &SimpleInterval) -> CompoundInterval {
        if info.range().contains_interval(interval) {
            return CompoundInterval::of(interval.clone());
        }
        let (lower, upper) = match (interval.lower_bound(), interval.upper_bound()) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return CompoundInterval::of(info.range()),
        };
        let size = info.range_size();
        if upper - lower + BigInt::one() >= size {
            return CompoundInterval::of(info.range());
        }
        let shift = floor_div(&(lower - info.min_value()), &size);
        let offset = &shift * &size;
        let shifted_lower = lower - &offset;
        let shifted_upper = upper - &offset;
        if shifted_upper <= info.max_value() {
            CompoundInterval::of(SimpleInterval::of(shifted_lower, shifted_upper))
        } else {
            CompoundInterval::of(info.range())
        }
    }

    /// Exact modular re-centering of one interval, splitting at the range
    /// boundary when necessary
    fn wrap_interval(&self, info: &BitVectorInfo, interval: &SimpleInterval) -> CompoundInterval {
        if info.range().contains_interval(interval) {
            return CompoundInterval::of(interval.clone());
        }
        let (lower, upper) = match (interval.lower_bound(), interval.upper_bound()) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return CompoundInterval::of(info.range()),
        };
        let size = info.range_size();
        if upper - lower + BigInt::one() >= size {
            return CompoundInterval::of(info.range());
        }
        let shift = floor_div(&(lower - info.min_value()), &size);
        let offset = &shift * &size;
        let shifted_lower = lower - &offset;
        let shifted_upper = upper - &offset;
        if shifted_upper <= info.max_value() {
            CompoundInterval::of(SimpleInterval::of(shifted_lower, shifted_upper))
        } else {
            CompoundInterval::of(SimpleInterval::of(shifted_lower, info.max_value())).union_with(
                &CompoundInterval::of(SimpleInterval::of(
                    info.min_value(),
                    shifted_upper - size,
                )),
            )
        }
    }

    /// Applies the wraparound policy to an exact arithmetic result
    fn handle_overflow(&self, info: &BitVectorInfo, interval: SimpleInterval) -> CompoundInterval {
        if info.range().contains_interval(&interval) {
            return CompoundInterval::of(interval);
        }
        if !info.is_signed() || self.allow_signed_wrap_around {
            return self.wrap_interval(info, &interval);
        }
        log::debug!(
            "signed overflow on {}: {} exceeds [{}, {}]",
            info,
            interval,
            info.min_value(),
            info.max_value()
        );
        self.overflow_event_handler.signed_overflow();
        CompoundInterval::of(info.range())
    }

    fn add_intervals(
        &self,
        info: &BitVectorInfo,
        x: &SimpleInterval,
        y: &SimpleInterval,
    ) -> CompoundInterval {
        let lower = match (x.lower_bound(), y.lower_bound()) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
        let upper = match (x.upper_bound(), y.upper_bound()) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
        self.handle_overflow(info, interval_from_bounds(lower, upper))
    }

    fn multiply_intervals(
        &self,
        info: &BitVectorInfo,
        x: &SimpleInterval,
        y: &SimpleInterval,
    ) -> CompoundInterval {
        let bounds = match (
            x.lower_bound(),
            x.upper_bound(),
            y.lower_bound(),
            y.upper_bound(),
        ) {
            (Some(xl), Some(xu), Some(yl), Some(yu)) => (xl, xu, yl, yu),
            _ => return CompoundInterval::of(info.range()),
        };
        let (xl, xu, yl, yu) = bounds;
        let products = [xl * yl, xl * yu, xu * yl, xu * yu];
        let mut lower = products[0].clone();
        let mut upper = products[0].clone();
        for product in &products[1..] {
            if *product < lower {
                lower = product.clone();
            }
            if *product > upper {
                upper = product.clone();
            }
        }
        self.handle_overflow(info, SimpleInterval::of(lower, upper))
    }

    /// Truncated division of one dividend interval by one sign-pure,
    /// zero-free divisor interval
    fn divide_intervals(
        &self,
        info: &BitVectorInfo,
        x: &SimpleInterval,
        d: &SimpleInterval,
    ) -> CompoundInterval {
        let (d_lower, d_upper) = match (d.lower_bound(), d.upper_bound()) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return CompoundInterval::of(info.range()),
        };
        let negative_divisor = d_lower.is_negative();
        let (d_min_abs, d_max_abs) = if negative_divisor {
            (d_upper.abs(), d_lower.abs())
        } else {
            (d_lower.clone(), d_upper.clone())
        };
        let mut result = CompoundInterval::bottom();
        for (min_mag, max_mag, negative_dividend) in magnitude_parts(x) {
            let quot_min = floor_div(&min_mag, &d_max_abs);
            let quot_max = max_mag.map(|mag| floor_div(&mag, &d_min_abs));
            let interval = if negative_dividend != negative_divisor {
                interval_from_bounds(quot_max.map(|q| -q), Some(-quot_min))
            } else {
                interval_from_bounds(Some(quot_min), quot_max)
            };
            result = result.union_with(&self.handle_overflow(info, interval));
        }
        result
    }

    /// Truncated remainder of one dividend interval by one sign-pure,
    /// zero-free divisor interval; exact for singleton divisors
    fn modulo_intervals(
        &self,
        info: &BitVectorInfo,
        x: &SimpleInterval,
        d: &SimpleInterval,
    ) -> CompoundInterval {
        let (d_lower, d_upper) = match (d.lower_bound(), d.upper_bound()) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return CompoundInterval::of(info.range()),
        };
        let d_max_abs = d_lower.abs().max(d_upper.abs());
        let singleton_divisor = d_lower == d_upper;
        let mut result = CompoundInterval::bottom();
        for (min_mag, max_mag, negative_dividend) in magnitude_parts(x) {
            let residues = if singleton_divisor {
                self.residues_of(&min_mag, max_mag.as_ref(), &d_max_abs)
            } else {
                let bound = &d_max_abs - BigInt::one();
                let upper = match &max_mag {
                    Some(mag) => min(mag, &bound).clone(),
                    None => bound,
                };
                CompoundInterval::of(SimpleInterval::of(BigInt::zero(), upper))
            };
            result = result.union_with(&if negative_dividend {
                residues.negate()
            } else {
                residues
            });
        }
        result
    }

    /// The exact residue set of magnitudes `[min_mag, max_mag]` modulo `m`
    fn residues_of(
        &self,
        min_mag: &BigInt,
        max_mag: Option<&BigInt>,
        m: &BigInt,
    ) -> CompoundInterval {
        let all_residues =
            CompoundInterval::of(SimpleInterval::of(BigInt::zero(), m - BigInt::one()));
        let max_mag = match max_mag {
            Some(max_mag) => max_mag,
            None => return all_residues,
        };
        if max_mag - min_mag + BigInt::one() >= *m {
            return all_residues;
        }
        let low = min_mag % m;
        let high = max_mag % m;
        if low <= high {
            CompoundInterval::of(SimpleInterval::of(low, high))
        } else {
            CompoundInterval::of(SimpleInterval::of(BigInt::zero(), high))
                .union_with(&CompoundInterval::of(SimpleInterval::of(
                    low,
                    m - BigInt::one(),
                )))
        }
    }

    fn shift_left_intervals(
        &self,
        info: &BitVectorInfo,
        x: &SimpleInterval,
        s: &SimpleInterval,
    ) -> CompoundInterval {
        let (s_lower, s_upper) = match (s.lower_bound(), s.upper_bound()) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return CompoundInterval::of(info.range()),
        };
        if s_lower.is_negative() {
            return CompoundInterval::of(info.range());
        }
        let width = BigInt::from(info.bit_size());
        let full = CompoundInterval::of(info.range());
        let mut result = CompoundInterval::bottom();
        let mut distance = s_lower.clone();
        loop {
            if distance >= width {
                return result.union_with(&full);
            }
            let factor = match distance.to_usize() {
                Some(distance) => BigInt::one() << distance,
                None => return result.union_with(&full),
            };
            let lower = x.lower_bound().map(|bound| bound * &factor);
            let upper = x.upper_bound().map(|bound| bound * &factor);
            result =
                result.union_with(&self.handle_overflow(info, interval_from_bounds(lower, upper)));
            if result == full || distance == *s_upper {
                return result;
            }
            distance += BigInt::one();
        }
    }

    fn shift_right_intervals(
        &self,
        info: &BitVectorInfo,
        x: &SimpleInterval,
        s: &SimpleInterval,
    ) -> CompoundInterval {
        let (s_lower, s_upper) = match (s.lower_bound(), s.upper_bound()) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return CompoundInterval::of(info.range()),
        };
        if s_lower.is_negative() {
            return CompoundInterval::of(info.range());
        }
        let width = BigInt::from(info.bit_size());
        let mut result = CompoundInterval::bottom();
        let mut distance = s_lower.clone();
        loop {
            // beyond the width every further shift yields the same sign fill
            let effective = min(&distance, &width).clone();
            let factor = match effective.to_usize() {
                Some(effective) => BigInt::one() << effective,
                None => return CompoundInterval::of(info.range()),
            };
            let lower = x.lower_bound().map(|bound| floor_div(bound, &factor));
            let upper = x.upper_bound().map(|bound| floor_div(bound, &factor));
            result = result.union_with(&CompoundInterval::of(interval_from_bounds(lower, upper)));
            if distance >= width || distance == *s_upper {
                return result;
            }
            distance += BigInt::one();
        }
    }
}

fn interval_from_bounds(lower: Option<BigInt>, upper: Option<BigInt>) -> SimpleInterval {
    match (lower, upper) {
        (Some(lower), Some(upper)) => SimpleInterval::of(lower, upper),
        (Some(lower), None) => SimpleInterval::greater_or_equal(lower),
        (None, Some(upper)) => SimpleInterval::less_or_equal(upper),
        (None, None) => SimpleInterval::infinite(),
    }
}

/// Splits a dividend interval at zero into parts described by their
/// magnitude range and sign
fn magnitude_parts(x: &SimpleInterval) -> Vec<(BigInt, Option<BigInt>, bool)> {
    let mut parts = Vec::new();
    if let Some(below) = x.intersection(&SimpleInterval::less_or_equal(-1)) {
        if let Some(upper) = below.upper_bound() {
            parts.push((-upper, below.lower_bound().map(|lower| -lower), true));
        }
    }
    if let Some(above) = x.intersection(&SimpleInterval::greater_or_equal(0)) {
        if let Some(lower) = above.lower_bound() {
            parts.push((lower.clone(), above.upper_bound().cloned(), false));
        }
    }
    parts
}

/// Division rounding towards negative infinity; the divisor must be positive
fn floor_div(dividend: &BigInt, divisor: &BigInt) -> BigInt {
    let quotient = dividend / divisor;
    if (dividend - &quotient * divisor).is_negative() {
        quotient - BigInt::one()
    } else {
        quotient
    }
}
