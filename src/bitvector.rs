//! Machine integer type descriptors and their legal value ranges.

use crate::compound::CompoundInterval;
use crate::interval::SimpleInterval;
use num_bigint::BigInt;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and signedness of a machine integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BitVectorInfo {
    bit_size: u32,
    signed: bool,
}

impl BitVectorInfo {
    /// Creates a descriptor for an integer type of the given width
    ///
    /// # Panics
    ///
    /// Panics if `bit_size` is zero.
    pub fn new(bit_size: u32, signed: bool) -> Self {
        assert!(bit_size > 0, "bit-vector width must be positive");
        Self { bit_size, signed }
    }

    /// Width in bits
    pub fn bit_size(&self) -> u32 {
        self.bit_size
    }

    /// Whether values are interpreted in two's complement
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Smallest representable value
    pub fn min_value(&self) -> BigInt {
        if self.signed {
            -(BigInt::one() << (self.bit_size - 1) as usize)
        } else {
            BigInt::zero()
        }
    }

    /// Largest representable value
    pub fn max_value(&self) -> BigInt {
        if self.signed {
            (BigInt::one() << (self.bit_size - 1) as usize) - 1
        } else {
            (BigInt::one() << self.bit_size as usize) - 1
        }
    }

    /// Number of distinct representable values
    pub fn range_size(&self) -> BigInt {
        BigInt::one() << self.bit_size as usize
    }

    /// The legal value range as a single interval
    pub fn range(&self) -> SimpleInterval {
        SimpleInterval::of(self.min_value(), self.max_value())
    }

    /// Whether the value is representable without wraparound
    pub fn contains(&self, value: &BigInt) -> bool {
        *value >= self.min_value() && *value <= self.max_value()
    }
}

impl fmt::Display for BitVectorInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}",
            if self.signed { 'i' } else { 'u' },
            self.bit_size
        )
    }
}

/// Width tag of a floating-point type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FloatKind {
    /// 32 bit IEEE 754
    Single,
    /// 64 bit IEEE 754
    Double,
}

/// Type descriptor of a tracked variable.
///
/// Floating-point types are carried only so that variables of such types can
/// be tracked at all; their values are never modeled more precisely than
/// "any value".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeInfo {
    /// Fixed-width integer type
    BitVector(BitVectorInfo),
    /// Floating-point placeholder, always imprecise
    FloatingPoint(FloatKind),
}

impl TypeInfo {
    /// Creates an unsigned integer type descriptor of the given width
    pub fn unsigned(bit_size: u32) -> Self {
        TypeInfo::BitVector(BitVectorInfo::new(bit_size, false))
    }

    /// Creates a signed integer type descriptor of the given width
    pub fn signed(bit_size: u32) -> Self {
        TypeInfo::BitVector(BitVectorInfo::new(bit_size, true))
    }

    /// The bit-vector descriptor, if this is an integer type
    pub fn bit_vector(&self) -> Option<&BitVectorInfo> {
        match self {
            TypeInfo::BitVector(info) => Some(info),
            TypeInfo::FloatingPoint(_) => None,
        }
    }

    /// Whether values of this type can be negative
    pub fn is_signed(&self) -> bool {
        match self {
            TypeInfo::BitVector(info) => info.is_signed(),
            TypeInfo::FloatingPoint(_) => true,
        }
    }

    /// Every value a variable of this type can legally hold
    pub fn all_possible_values(&self) -> CompoundInterval {
        match self {
            TypeInfo::BitVector(info) => CompoundInterval::of(info.range()),
            TypeInfo::FloatingPoint(_) => CompoundInterval::top(),
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeInfo::BitVector(info) => info.fmt(f),
            TypeInfo::FloatingPoint(FloatKind::Single) => f.write_str("f32"),
            TypeInfo::FloatingPoint(FloatKind::Double) => f.write_str("f64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_complement_bounds() {
        let i8_info = BitVectorInfo::new(8, true);
        assert_eq!(i8_info.min_value(), BigInt::from(-128));
        assert_eq!(i8_info.max_value(), BigInt::from(127));
        assert_eq!(i8_info.range_size(), BigInt::from(256));

        let u8_info = BitVectorInfo::new(8, false);
        assert_eq!(u8_info.min_value(), BigInt::from(0));
        assert_eq!(u8_info.max_value(), BigInt::from(255));

        let i32_info = BitVectorInfo::new(32, true);
        assert_eq!(i32_info.min_value(), BigInt::from(i32::MIN));
        assert_eq!(i32_info.max_value(), BigInt::from(i32::MAX));
    }

    #[test]
    #[should_panic(expected = "positive")]
    fn zero_width_rejected() {
        BitVectorInfo::new(0, false);
    }

    #[test]
    fn range_membership() {
        let u8_info = BitVectorInfo::new(8, false);
        assert!(u8_info.contains(&BigInt::from(0)));
        assert!(u8_info.contains(&BigInt::from(255)));
        assert!(!u8_info.contains(&BigInt::from(256)));
        assert!(!u8_info.contains(&BigInt::from(-1)));
    }

    #[test]
    fn display_names() {
        assert_eq!(TypeInfo::signed(8).to_string(), "i8");
        assert_eq!(TypeInfo::unsigned(64).to_string(), "u64");
        assert_eq!(TypeInfo::FloatingPoint(FloatKind::Double).to_string(), "f64");
    }
}
