//! Dimensions of the source language's integer types on a target machine.

use crate::bitvector::TypeInfo;

/// The source-level integer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceIntType {
    /// `_Bool`
    Bool,
    /// `char`, whose signedness the machine model decides
    Char,
    /// `signed char`
    SignedChar,
    /// `unsigned char`
    UnsignedChar,
    /// `short`
    Short,
    /// `unsigned short`
    UnsignedShort,
    /// `int`
    Int,
    /// `unsigned int`
    UnsignedInt,
    /// `long`
    Long,
    /// `unsigned long`
    UnsignedLong,
    /// `long long`
    LongLong,
    /// `unsigned long long`
    UnsignedLongLong,
}

/// Widths and signedness conventions of one target machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineModel {
    /// Whether plain `char` is signed
    pub char_is_signed: bool,
    /// Width of `short` in bits
    pub short_bits: u32,
    /// Width of `int` in bits
    pub int_bits: u32,
    /// Width of `long` in bits
    pub long_bits: u32,
    /// Width of `long long` in bits
    pub long_long_bits: u32,
}

impl MachineModel {
    /// The common 32 bit data model with 32 bit `long`
    pub fn ilp32() -> Self {
        Self {
            char_is_signed: true,
            short_bits: 16,
            int_bits: 32,
            long_bits: 32,
            long_long_bits: 64,
        }
    }

    /// The common 64 bit data model with 64 bit `long`
    pub fn lp64() -> Self {
        Self {
            char_is_signed: true,
            short_bits: 16,
            int_bits: 32,
            long_bits: 64,
            long_long_bits: 64,
        }
    }

    /// The bit-vector type a source type occupies on this machine
    pub fn type_info(&self, source_type: SourceIntType) -> TypeInfo {
        match source_type {
            SourceIntType::Bool => TypeInfo::unsigned(1),
            SourceIntType::Char => {
                if self.char_is_signed {
                    TypeInfo::signed(8)
                } else {
                    TypeInfo::unsigned(8)
                }
            }
            SourceIntType::SignedChar => TypeInfo::signed(8),
            SourceIntType::UnsignedChar => TypeInfo::unsigned(8),
            SourceIntType::Short => TypeInfo::signed(self.short_bits),
            SourceIntType::UnsignedShort => TypeInfo::unsigned(self.short_bits),
            SourceIntType::Int => TypeInfo::signed(self.int_bits),
            SourceIntType::UnsignedInt => TypeInfo::unsigned(self.int_bits),
            SourceIntType::Long => TypeInfo::signed(self.long_bits),
            SourceIntType::UnsignedLong => TypeInfo::unsigned(self.long_bits),
            SourceIntType::LongLong => TypeInfo::signed(self.long_long_bits),
            SourceIntType::UnsignedLongLong => TypeInfo::unsigned(self.long_long_bits),
        }
    }
}

impl Default for MachineModel {
    fn default() -> Self {
        Self::lp64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_models_differ_in_long() {
        assert_eq!(
            MachineModel::ilp32().type_info(SourceIntType::Long),
            TypeInfo::signed(32)
        );
        assert_eq!(
            MachineModel::lp64().type_info(SourceIntType::Long),
            TypeInfo::signed(64)
        );
        assert_eq!(
            MachineModel::lp64().type_info(SourceIntType::Bool),
            TypeInfo::unsigned(1)
        );
        assert_eq!(
            MachineModel::lp64().type_info(SourceIntType::UnsignedLongLong),
            TypeInfo::unsigned(64)
        );
    }
}
