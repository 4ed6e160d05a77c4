//! Symbolic formulas over program variables and the folding builder that
//! constructs them.

use crate::bitvector::TypeInfo;
use crate::compound::CompoundInterval;
use crate::manager::CompoundIntervalManagerFactory;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Identifies one program variable.
///
/// Function-local variables carry their function name as a `function::name`
/// prefix; global variables are bare names. Aggregate accesses that the
/// analysis cannot track are encoded with marker characters and recognized
/// by [`MemoryLocation::is_unsupported_form`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryLocation(String);

impl MemoryLocation {
    /// A global variable
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// A variable local to `function`
    pub fn scoped(function: &str, identifier: &str) -> Self {
        Self(format!("{function}::{identifier}"))
    }

    /// The full qualified name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The function qualifier, absent for globals
    pub fn function(&self) -> Option<&str> {
        self.0.split_once("::").map(|(function, _)| function)
    }

    /// Whether this variable is local to `function`
    pub fn is_scoped_in(&self, function: &str) -> bool {
        self.function() == Some(function)
    }

    /// Whether this location stands for an access the analysis cannot
    /// track precisely, such as an array element or a pointer dereference
    pub fn is_unsupported_form(&self) -> bool {
        self.0.contains('[') || self.0.contains('*') || self.0.contains("->")
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemoryLocation {
    fn from(identifier: &str) -> Self {
        Self::new(identifier)
    }
}

impl From<String> for MemoryLocation {
    fn from(identifier: String) -> Self {
        Self(identifier)
    }
}

/// A numeral formula tree.
///
/// Every node carries the type its value is computed in. Sharing is through
/// [`Arc`], so substitution can reuse untouched subtrees.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumeralFormula {
    /// A literal value set
    Constant {
        /// Type the value is of
        type_info: TypeInfo,
        /// The values
        value: CompoundInterval,
    },
    /// A program variable
    Variable {
        /// Type of the variable
        type_info: TypeInfo,
        /// The variable
        location: MemoryLocation,
    },
    /// Sum of two formulas
    Add {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Left operand
        op1: Arc<NumeralFormula>,
        /// Right operand
        op2: Arc<NumeralFormula>,
    },
    /// Product of two formulas
    Multiply {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Left operand
        op1: Arc<NumeralFormula>,
        /// Right operand
        op2: Arc<NumeralFormula>,
    },
    /// Truncated quotient of two formulas
    Divide {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Dividend
        op1: Arc<NumeralFormula>,
        /// Divisor
        op2: Arc<NumeralFormula>,
    },
    /// Truncated remainder of two formulas
    Modulo {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Dividend
        op1: Arc<NumeralFormula>,
        /// Divisor
        op2: Arc<NumeralFormula>,
    },
    /// Bitwise and of two formulas
    BinaryAnd {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Left operand
        op1: Arc<NumeralFormula>,
        /// Right operand
        op2: Arc<NumeralFormula>,
    },
    /// Bitwise or of two formulas
    BinaryOr {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Left operand
        op1: Arc<NumeralFormula>,
        /// Right operand
        op2: Arc<NumeralFormula>,
    },
    /// Bitwise exclusive or of two formulas
    BinaryXor {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Left operand
        op1: Arc<NumeralFormula>,
        /// Right operand
        op2: Arc<NumeralFormula>,
    },
    /// Left shift
    ShiftLeft {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Shifted operand
        op1: Arc<NumeralFormula>,
        /// Shift distance
        op2: Arc<NumeralFormula>,
    },
    /// Arithmetic right shift
    ShiftRight {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// Shifted operand
        op1: Arc<NumeralFormula>,
        /// Shift distance
        op2: Arc<NumeralFormula>,
    },
    /// Either of two formulas; the value source is unknown
    Union {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// One alternative
        op1: Arc<NumeralFormula>,
        /// The other alternative
        op2: Arc<NumeralFormula>,
    },
    /// Any value of the type except the values of the operand
    Exclusion {
        /// Type the operation is computed in
        type_info: TypeInfo,
        /// The excluded values
        excluded: Arc<NumeralFormula>,
    },
    /// Conversion of the operand into another type
    Cast {
        /// Target type
        type_info: TypeInfo,
        /// Converted operand
        operand: Arc<NumeralFormula>,
    },
}

impl NumeralFormula {
    /// The type this formula evaluates in
    pub fn type_info(&self) -> TypeInfo {
        match self {
            NumeralFormula::Constant { type_info, .. }
            | NumeralFormula::Variable { type_info, .. }
            | NumeralFormula::Add { type_info, .. }
            | NumeralFormula::Multiply { type_info, .. }
            | NumeralFormula::Divide { type_info, .. }
            | NumeralFormula::Modulo { type_info, .. }
            | NumeralFormula::BinaryAnd { type_info, .. }
            | NumeralFormula::BinaryOr { type_info, .. }
            | NumeralFormula::BinaryXor { type_info, .. }
            | NumeralFormula::ShiftLeft { type_info, .. }
            | NumeralFormula::ShiftRight { type_info, .. }
            | NumeralFormula::Union { type_info, .. }
            | NumeralFormula::Exclusion { type_info, .. }
            | NumeralFormula::Cast { type_info, .. } => *type_info,
        }
    }

    /// All variables occurring in this formula
    pub fn collect_variables(&self, into: &mut BTreeSet<MemoryLocation>) {
        match self {
            NumeralFormula::Constant { .. } => {}
            NumeralFormula::Variable { location, .. } => {
                into.insert(location.clone());
            }
            NumeralFormula::Add { op1, op2, .. }
            | NumeralFormula::Multiply { op1, op2, .. }
            | NumeralFormula::Divide { op1, op2, .. }
            | NumeralFormula::Modulo { op1, op2, .. }
            | NumeralFormula::BinaryAnd { op1, op2, .. }
            | NumeralFormula::BinaryOr { op1, op2, .. }
            | NumeralFormula::BinaryXor { op1, op2, .. }
            | NumeralFormula::ShiftLeft { op1, op2, .. }
            | NumeralFormula::ShiftRight { op1, op2, .. }
            | NumeralFormula::Union { op1, op2, .. } => {
                op1.collect_variables(into);
                op2.collect_variables(into);
            }
            NumeralFormula::Exclusion { excluded, .. } => excluded.collect_variables(into),
            NumeralFormula::Cast { operand, .. } => operand.collect_variables(into),
        }
    }

    /// The variables of this formula as a fresh set
    pub fn variables(&self) -> BTreeSet<MemoryLocation> {
        let mut variables = BTreeSet::new();
        self.collect_variables(&mut variables);
        variables
    }

    /// Whether `location` occurs in this formula
    pub fn mentions(&self, location: &MemoryLocation) -> bool {
        match self {
            NumeralFormula::Constant { .. } => false,
            NumeralFormula::Variable { location: own, .. } => own == location,
            NumeralFormula::Add { op1, op2, .. }
            | NumeralFormula::Multiply { op1, op2, .. }
            | NumeralFormula::Divide { op1, op2, .. }
            | NumeralFormula::Modulo { op1, op2, .. }
            | NumeralFormula::BinaryAnd { op1, op2, .. }
            | NumeralFormula::BinaryOr { op1, op2, .. }
            | NumeralFormula::BinaryXor { op1, op2, .. }
            | NumeralFormula::ShiftLeft { op1, op2, .. }
            | NumeralFormula::ShiftRight { op1, op2, .. }
            | NumeralFormula::Union { op1, op2, .. } => {
                op1.mentions(location) || op2.mentions(location)
            }
            NumeralFormula::Exclusion { excluded, .. } => excluded.mentions(location),
            NumeralFormula::Cast { operand, .. } => operand.mentions(location),
        }
    }

    /// Nesting depth, where constants and variables count one
    pub fn depth(&self) -> usize {
        match self {
            NumeralFormula::Constant { .. } | NumeralFormula::Variable { .. } => 1,
            NumeralFormula::Add { op1, op2, .. }
            | NumeralFormula::Multiply { op1, op2, .. }
            | NumeralFormula::Divide { op1, op2, .. }
            | NumeralFormula::Modulo { op1, op2, .. }
            | NumeralFormula::BinaryAnd { op1, op2, .. }
            | NumeralFormula::BinaryOr { op1, op2, .. }
            | NumeralFormula::BinaryXor { op1, op2, .. }
            | NumeralFormula::ShiftLeft { op1, op2, .. }
            | NumeralFormula::ShiftRight { op1, op2, .. }
            | NumeralFormula::Union { op1, op2, .. } => 1 + op1.depth().max(op2.depth()),
            NumeralFormula::Exclusion { excluded, .. } => 1 + excluded.depth(),
            NumeralFormula::Cast { operand, .. } => 1 + operand.depth(),
        }
    }

    /// Substitutes every occurrence of the variable `target` by
    /// `replacement`, reusing untouched subtrees
    pub fn replace(
        formula: &Arc<NumeralFormula>,
        target: &MemoryLocation,
        replacement: &Arc<NumeralFormula>,
    ) -> Arc<NumeralFormula> {
        let rebuild_binary = |op1: &Arc<NumeralFormula>, op2: &Arc<NumeralFormula>| {
            let new1 = Self::replace(op1, target, replacement);
            let new2 = Self::replace(op2, target, replacement);
            if Arc::ptr_eq(&new1, op1) && Arc::ptr_eq(&new2, op2) {
                None
            } else {
                Some((new1, new2))
            }
        };
        match formula.as_ref() {
            NumeralFormula::Constant { .. } => Arc::clone(formula),
            NumeralFormula::Variable { location, .. } => {
                if location == target {
                    Arc::clone(replacement)
                } else {
                    Arc::clone(formula)
                }
            }
            NumeralFormula::Add { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::Add {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::Multiply { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::Multiply {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::Divide { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::Divide {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::Modulo { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::Modulo {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::BinaryAnd { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::BinaryAnd {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::BinaryOr { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::BinaryOr {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::BinaryXor { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::BinaryXor {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::ShiftLeft { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::ShiftLeft {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::ShiftRight { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::ShiftRight {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::Union { type_info, op1, op2 } => match rebuild_binary(op1, op2) {
                Some((op1, op2)) => Arc::new(NumeralFormula::Union {
                    type_info: *type_info,
                    op1,
                    op2,
                }),
                None => Arc::clone(formula),
            },
            NumeralFormula::Exclusion { type_info, excluded } => {
                let new = Self::replace(excluded, target, replacement);
                if Arc::ptr_eq(&new, excluded) {
                    Arc::clone(formula)
                } else {
                    Arc::new(NumeralFormula::Exclusion {
                        type_info: *type_info,
                        excluded: new,
                    })
                }
            }
            NumeralFormula::Cast { type_info, operand } => {
                let new = Self::replace(operand, target, replacement);
                if Arc::ptr_eq(&new, operand) {
                    Arc::clone(formula)
                } else {
                    Arc::new(NumeralFormula::Cast {
                        type_info: *type_info,
                        operand: new,
                    })
                }
            }
        }
    }
}

impl fmt::Display for NumeralFormula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NumeralFormula::Constant { value, .. } => match value.value() {
                Some(single) => write!(f, "{single}"),
                None => write!(f, "{value}"),
            },
            NumeralFormula::Variable { location, .. } => write!(f, "{location}"),
            NumeralFormula::Add { op1, op2, .. } => write!(f, "({op1} + {op2})"),
            NumeralFormula::Multiply { op1, op2, .. } => write!(f, "({op1} * {op2})"),
            NumeralFormula::Divide { op1, op2, .. } => write!(f, "({op1} / {op2})"),
            NumeralFormula::Modulo { op1, op2, .. } => write!(f, "({op1} % {op2})"),
            NumeralFormula::BinaryAnd { op1, op2, .. } => write!(f, "({op1} & {op2})"),
            NumeralFormula::BinaryOr { op1, op2, .. } => write!(f, "({op1} | {op2})"),
            NumeralFormula::BinaryXor { op1, op2, .. } => write!(f, "({op1} ^ {op2})"),
            NumeralFormula::ShiftLeft { op1, op2, .. } => write!(f, "({op1} << {op2})"),
            NumeralFormula::ShiftRight { op1, op2, .. } => write!(f, "({op1} >> {op2})"),
            NumeralFormula::Union { op1, op2, .. } => write!(f, "({op1} u {op2})"),
            NumeralFormula::Exclusion { excluded, .. } => write!(f, "\\{excluded}"),
            NumeralFormula::Cast { type_info, operand } => {
                write!(f, "(({type_info}) {operand})")
            }
        }
    }
}

/// A boolean formula tree over numeral formulas
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BooleanFormula {
    /// A known truth value
    Constant(bool),
    /// Equality of two numeral formulas
    Equal {
        /// Left operand
        op1: Arc<NumeralFormula>,
        /// Right operand
        op2: Arc<NumeralFormula>,
    },
    /// Strict order of two numeral formulas
    LessThan {
        /// Left operand
        op1: Arc<NumeralFormula>,
        /// Right operand
        op2: Arc<NumeralFormula>,
    },
    /// Conjunction
    LogicalAnd {
        /// Left operand
        op1: Arc<BooleanFormula>,
        /// Right operand
        op2: Arc<BooleanFormula>,
    },
    /// Negation
    LogicalNot {
        /// Negated operand
        op: Arc<BooleanFormula>,
    },
}

impl BooleanFormula {
    /// All variables occurring in this formula
    pub fn collect_variables(&self, into: &mut BTreeSet<MemoryLocation>) {
        match self {
            BooleanFormula::Constant(_) => {}
            BooleanFormula::Equal { op1, op2 } | BooleanFormula::LessThan { op1, op2 } => {
                op1.collect_variables(into);
                op2.collect_variables(into);
            }
            BooleanFormula::LogicalAnd { op1, op2 } => {
                op1.collect_variables(into);
                op2.collect_variables(into);
            }
            BooleanFormula::LogicalNot { op } => op.collect_variables(into),
        }
    }

    /// The variables of this formula as a fresh set
    pub fn variables(&self) -> BTreeSet<MemoryLocation> {
        let mut variables = BTreeSet::new();
        self.collect_variables(&mut variables);
        variables
    }

    /// Whether `location` occurs in this formula
    pub fn mentions(&self, location: &MemoryLocation) -> bool {
        match self {
            BooleanFormula::Constant(_) => false,
            BooleanFormula::Equal { op1, op2 } | BooleanFormula::LessThan { op1, op2 } => {
                op1.mentions(location) || op2.mentions(location)
            }
            BooleanFormula::LogicalAnd { op1, op2 } => {
                op1.mentions(location) || op2.mentions(location)
            }
            BooleanFormula::LogicalNot { op } => op.mentions(location),
        }
    }

    /// Substitutes every occurrence of the variable `target` by the numeral
    /// formula `replacement`, reusing untouched subtrees
    pub fn replace(
        formula: &Arc<BooleanFormula>,
        target: &MemoryLocation,
        replacement: &Arc<NumeralFormula>,
    ) -> Arc<BooleanFormula> {
        match formula.as_ref() {
            BooleanFormula::Constant(_) => Arc::clone(formula),
            BooleanFormula::Equal { op1, op2 } => {
                let new1 = NumeralFormula::replace(op1, target, replacement);
                let new2 = NumeralFormula::replace(op2, target, replacement);
                if Arc::ptr_eq(&new1, op1) && Arc::ptr_eq(&new2, op2) {
                    Arc::clone(formula)
                } else {
                    Arc::new(BooleanFormula::Equal {
                        op1: new1,
                        op2: new2,
                    })
                }
            }
            BooleanFormula::LessThan { op1, op2 } => {
                let new1 = NumeralFormula::replace(op1, target, replacement);
                let new2 = NumeralFormula::replace(op2, target, replacement);
                if Arc::ptr_eq(&new1, op1) && Arc::ptr_eq(&new2, op2) {
                    Arc::clone(formula)
                } else {
                    Arc::new(BooleanFormula::LessThan {
                        op1: new1,
                        op2: new2,
                    })
                }
            }
            BooleanFormula::LogicalAnd { op1, op2 } => {
                let new1 = Self::replace(op1, target, replacement);
                let new2 = Self::replace(op2, target, replacement);
                if Arc::ptr_eq(&new1, op1) && Arc::ptr_eq(&new2, op2) {
                    Arc::clone(formula)
                } else {
                    Arc::new(BooleanFormula::LogicalAnd {
                        op1: new1,
                        op2: new2,
                    })
                }
            }
            BooleanFormula::LogicalNot { op } => {
                let new = Self::replace(op, target, replacement);
                if Arc::ptr_eq(&new, op) {
                    Arc::clone(formula)
                } else {
                    Arc::new(BooleanFormula::LogicalNot { op: new })
                }
            }
        }
    }

    /// Splits nested conjunctions into their conjuncts
    pub fn split_conjunctions(formula: &Arc<BooleanFormula>) -> Vec<Arc<BooleanFormula>> {
        let mut conjuncts = Vec::new();
        Self::push_conjuncts(formula, &mut conjuncts);
        conjuncts
    }

    fn push_conjuncts(formula: &Arc<BooleanFormula>, into: &mut Vec<Arc<BooleanFormula>>) {
        match formula.as_ref() {
            BooleanFormula::LogicalAnd { op1, op2 } => {
                Self::push_conjuncts(op1, into);
                Self::push_conjuncts(op2, into);
            }
            _ => into.push(Arc::clone(formula)),
        }
    }
}

impl fmt::Display for BooleanFormula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BooleanFormula::Constant(value) => write!(f, "{value}"),
            BooleanFormula::Equal { op1, op2 } => write!(f, "({op1} == {op2})"),
            BooleanFormula::LessThan { op1, op2 } => write!(f, "({op1} < {op2})"),
            BooleanFormula::LogicalAnd { op1, op2 } => write!(f, "({op1} && {op2})"),
            BooleanFormula::LogicalNot { op } => write!(f, "!{op}"),
        }
    }
}

macro_rules! folding_binary {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $op:ident) => {
        $(#[$doc])*
        pub fn $name(
            &self,
            op1: &Arc<NumeralFormula>,
            op2: &Arc<NumeralFormula>,
        ) -> Arc<NumeralFormula> {
            let type_info = op1.type_info();
            debug_assert_eq!(type_info, op2.type_info());
            if let (
                NumeralFormula::Constant { value: a, .. },
                NumeralFormula::Constant { value: b, .. },
            ) = (op1.as_ref(), op2.as_ref())
            {
                let manager = self.factory.create_manager(type_info);
                return self.constant(type_info, manager.$op(a, b));
            }
            Arc::new(NumeralFormula::$variant {
                type_info,
                op1: Arc::clone(op1),
                op2: Arc::clone(op2),
            })
        }
    };
}

/// Builds formulas, folding operations on constants into constants on the
/// spot so trees stay as small as the available knowledge permits
#[derive(Debug, Clone)]
pub struct FormulaBuilder {
    factory: CompoundIntervalManagerFactory,
}

impl FormulaBuilder {
    /// A builder folding constants under the given policy
    pub fn new(factory: CompoundIntervalManagerFactory) -> Self {
        Self { factory }
    }

    /// The policy this builder folds under
    pub fn factory(&self) -> &CompoundIntervalManagerFactory {
        &self.factory
    }

    /// A literal value set
    pub fn constant(&self, type_info: TypeInfo, value: CompoundInterval) -> Arc<NumeralFormula> {
        Arc::new(NumeralFormula::Constant { type_info, value })
    }

    /// A literal single value
    pub fn singleton(&self, type_info: TypeInfo, value: impl Into<BigInt>) -> Arc<NumeralFormula> {
        self.constant(type_info, CompoundInterval::singleton(value))
    }

    /// A program variable
    pub fn variable(&self, type_info: TypeInfo, location: MemoryLocation) -> Arc<NumeralFormula> {
        Arc::new(NumeralFormula::Variable {
            type_info,
            location,
        })
    }

    folding_binary!(
        /// Sum of two formulas
        add,
        Add,
        add
    );
    folding_binary!(
        /// Product of two formulas
        multiply,
        Multiply,
        multiply
    );
    folding_binary!(
        /// Truncated quotient of two formulas
        divide,
        Divide,
        divide
    );
    folding_binary!(
        /// Truncated remainder of two formulas
        modulo,
        Modulo,
        modulo
    );
    folding_binary!(
        /// Bitwise and of two formulas
        binary_and,
        BinaryAnd,
        binary_and
    );
    folding_binary!(
        /// Bitwise or of two formulas
        binary_or,
        BinaryOr,
        binary_or
    );
    folding_binary!(
        /// Bitwise exclusive or of two formulas
        binary_xor,
        BinaryXor,
        binary_xor
    );
    folding_binary!(
        /// Left shift
        shift_left,
        ShiftLeft,
        shift_left
    );
    folding_binary!(
        /// Arithmetic right shift
        shift_right,
        ShiftRight,
        shift_right
    );

    /// Either of two formulas
    pub fn union(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<NumeralFormula> {
        let type_info = op1.type_info();
        debug_assert_eq!(type_info, op2.type_info());
        if op1 == op2 {
            return Arc::clone(op1);
        }
        if let (
            NumeralFormula::Constant { value: a, .. },
            NumeralFormula::Constant { value: b, .. },
        ) = (op1.as_ref(), op2.as_ref())
        {
            let manager = self.factory.create_manager(type_info);
            return self.constant(type_info, manager.union(a, b));
        }
        Arc::new(NumeralFormula::Union {
            type_info,
            op1: Arc::clone(op1),
            op2: Arc::clone(op2),
        })
    }

    /// Any value of the operand's type except the operand's values
    pub fn exclusion(&self, excluded: &Arc<NumeralFormula>) -> Arc<NumeralFormula> {
        let type_info = excluded.type_info();
        if let NumeralFormula::Constant { value, .. } = excluded.as_ref() {
            let manager = self.factory.create_manager(type_info);
            return self.constant(type_info, manager.invert(value));
        }
        Arc::new(NumeralFormula::Exclusion {
            type_info,
            excluded: Arc::clone(excluded),
        })
    }

    /// Conversion into `type_info`; a no-op when the operand already has
    /// that type
    pub fn cast(&self, type_info: TypeInfo, operand: &Arc<NumeralFormula>) -> Arc<NumeralFormula> {
        let from = operand.type_info();
        if from == type_info {
            return Arc::clone(operand);
        }
        if let NumeralFormula::Constant { value, .. } = operand.as_ref() {
            let manager = self.factory.create_manager(type_info);
            return self.constant(type_info, manager.cast(from, value));
        }
        Arc::new(NumeralFormula::Cast {
            type_info,
            operand: Arc::clone(operand),
        })
    }

    /// Negation, expressed as multiplication by minus one
    pub fn negate(&self, op: &Arc<NumeralFormula>) -> Arc<NumeralFormula> {
        let minus_one = self.singleton(op.type_info(), -1);
        self.multiply(op, &minus_one)
    }

    /// Difference, expressed as addition of the negated subtrahend
    pub fn subtract(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<NumeralFormula> {
        self.add(op1, &self.negate(op2))
    }

    /// A known truth value
    pub fn boolean_constant(&self, value: bool) -> Arc<BooleanFormula> {
        Arc::new(BooleanFormula::Constant(value))
    }

    /// Equality of two numeral formulas
    pub fn equal(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<BooleanFormula> {
        if op1 == op2 {
            return self.boolean_constant(true);
        }
        if let (
            NumeralFormula::Constant { value: a, .. },
            NumeralFormula::Constant { value: b, .. },
        ) = (op1.as_ref(), op2.as_ref())
        {
            let manager = self.factory.create_manager(op1.type_info());
            let comparison = manager.equal(a, b);
            if comparison.is_definitely_true() {
                return self.boolean_constant(true);
            }
            if comparison.is_definitely_false() {
                return self.boolean_constant(false);
            }
        }
        Arc::new(BooleanFormula::Equal {
            op1: Arc::clone(op1),
            op2: Arc::clone(op2),
        })
    }

    /// Strict order of two numeral formulas
    pub fn less_than(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<BooleanFormula> {
        if op1 == op2 {
            return self.boolean_constant(false);
        }
        if let (
            NumeralFormula::Constant { value: a, .. },
            NumeralFormula::Constant { value: b, .. },
        ) = (op1.as_ref(), op2.as_ref())
        {
            let manager = self.factory.create_manager(op1.type_info());
            let comparison = manager.less_than(a, b);
            if comparison.is_definitely_true() {
                return self.boolean_constant(true);
            }
            if comparison.is_definitely_false() {
                return self.boolean_constant(false);
            }
        }
        Arc::new(BooleanFormula::LessThan {
            op1: Arc::clone(op1),
            op2: Arc::clone(op2),
        })
    }

    /// Strict order, operands swapped
    pub fn greater_than(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<BooleanFormula> {
        self.less_than(op2, op1)
    }

    /// Non-strict order, expressed as the negated swapped strict order
    pub fn less_or_equal(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<BooleanFormula> {
        self.logical_not(&self.less_than(op2, op1))
    }

    /// Non-strict order, operands swapped
    pub fn greater_or_equal(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<BooleanFormula> {
        self.logical_not(&self.less_than(op1, op2))
    }

    /// Negated equality
    pub fn not_equal(
        &self,
        op1: &Arc<NumeralFormula>,
        op2: &Arc<NumeralFormula>,
    ) -> Arc<BooleanFormula> {
        self.logical_not(&self.equal(op1, op2))
    }

    /// Conjunction
    pub fn logical_and(
        &self,
        op1: &Arc<BooleanFormula>,
        op2: &Arc<BooleanFormula>,
    ) -> Arc<BooleanFormula> {
        match (op1.as_ref(), op2.as_ref()) {
            (BooleanFormula::Constant(false), _) | (_, BooleanFormula::Constant(false)) => {
                self.boolean_constant(false)
            }
            (BooleanFormula::Constant(true), _) => Arc::clone(op2),
            (_, BooleanFormula::Constant(true)) => Arc::clone(op1),
            _ if op1 == op2 => Arc::clone(op1),
            _ => Arc::new(BooleanFormula::LogicalAnd {
                op1: Arc::clone(op1),
                op2: Arc::clone(op2),
            }),
        }
    }

    /// Disjunction, expressed through conjunction and negation
    pub fn logical_or(
        &self,
        op1: &Arc<BooleanFormula>,
        op2: &Arc<BooleanFormula>,
    ) -> Arc<BooleanFormula> {
        self.logical_not(&self.logical_and(&self.logical_not(op1), &self.logical_not(op2)))
    }

    /// Negation, cancelling double negation
    pub fn logical_not(&self, op: &Arc<BooleanFormula>) -> Arc<BooleanFormula> {
        match op.as_ref() {
            BooleanFormula::Constant(value) => self.boolean_constant(!value),
            BooleanFormula::LogicalNot { op: inner } => Arc::clone(inner),
            _ => Arc::new(BooleanFormula::LogicalNot { op: Arc::clone(op) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> FormulaBuilder {
        FormulaBuilder::new(CompoundIntervalManagerFactory::default())
    }

    #[test]
    fn memory_locations() {
        let local = MemoryLocation::scoped("main", "i");
        assert_eq!(local.as_str(), "main::i");
        assert_eq!(local.function(), Some("main"));
        assert!(local.is_scoped_in("main"));
        assert!(!local.is_scoped_in("other"));
        let global = MemoryLocation::new("counter");
        assert_eq!(global.function(), None);
        assert!(!global.is_unsupported_form());
        assert!(MemoryLocation::new("a[3]").is_unsupported_form());
        assert!(MemoryLocation::new("p->next").is_unsupported_form());
        assert!(MemoryLocation::new("*p").is_unsupported_form());
    }

    #[test]
    fn constants_fold() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let sum = b.add(&b.singleton(ty, 2), &b.singleton(ty, 3));
        assert_eq!(
            sum.as_ref(),
            &NumeralFormula::Constant {
                type_info: ty,
                value: CompoundInterval::singleton(5),
            }
        );
        let x = b.variable(ty, MemoryLocation::new("x"));
        let open = b.add(&x, &b.singleton(ty, 3));
        assert!(matches!(open.as_ref(), NumeralFormula::Add { .. }));
        assert_eq!(open.depth(), 2);
    }

    #[test]
    fn union_and_cast_shortcuts() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = b.variable(ty, MemoryLocation::new("x"));
        assert_eq!(b.union(&x, &x), x);
        assert_eq!(b.cast(ty, &x), x);
        let widened = b.cast(TypeInfo::signed(64), &x);
        assert!(matches!(widened.as_ref(), NumeralFormula::Cast { .. }));
        assert_eq!(widened.type_info(), TypeInfo::signed(64));
        let narrowed = b.cast(TypeInfo::unsigned(8), &b.singleton(ty, 300));
        assert_eq!(
            narrowed.as_ref(),
            &NumeralFormula::Constant {
                type_info: TypeInfo::unsigned(8),
                value: CompoundInterval::singleton(44),
            }
        );
    }

    #[test]
    fn boolean_folds() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = b.variable(ty, MemoryLocation::new("x"));
        assert_eq!(b.equal(&x, &x).as_ref(), &BooleanFormula::Constant(true));
        assert_eq!(
            b.less_than(&x, &x).as_ref(),
            &BooleanFormula::Constant(false)
        );
        assert_eq!(
            b.less_than(&b.singleton(ty, 1), &b.singleton(ty, 2)).as_ref(),
            &BooleanFormula::Constant(true)
        );
        let open = b.less_than(&x, &b.singleton(ty, 2));
        let t = b.boolean_constant(true);
        assert_eq!(b.logical_and(&t, &open), open);
        assert_eq!(
            b.logical_and(&b.boolean_constant(false), &open).as_ref(),
            &BooleanFormula::Constant(false)
        );
        assert_eq!(b.logical_not(&b.logical_not(&open)), open);
    }

    #[test]
    fn replace_reuses_untouched_subtrees() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = MemoryLocation::new("x");
        let y = b.variable(ty, MemoryLocation::new("y"));
        let vx = b.variable(ty, x.clone());
        let sum = b.add(&vx, &y);
        let product = Arc::new(NumeralFormula::Multiply {
            type_info: ty,
            op1: Arc::clone(&sum),
            op2: Arc::clone(&y),
        });
        let replacement = b.singleton(ty, 7);
        let replaced = NumeralFormula::replace(&product, &x, &replacement);
        match replaced.as_ref() {
            NumeralFormula::Multiply { op1, op2, .. } => {
                assert!(matches!(op1.as_ref(), NumeralFormula::Add { .. }));
                assert!(op1.as_ref() != sum.as_ref());
                assert!(Arc::ptr_eq(op2, &y));
            }
            other => panic!("unexpected formula {other:?}"),
        }
        let untouched = NumeralFormula::replace(&product, &MemoryLocation::new("z"), &replacement);
        assert!(Arc::ptr_eq(&untouched, &product));
    }

    #[test]
    fn conjunctions_split() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = b.variable(ty, MemoryLocation::new("x"));
        let y = b.variable(ty, MemoryLocation::new("y"));
        let a = b.less_than(&x, &y);
        let c = b.equal(&y, &b.singleton(ty, 5));
        let d = b.less_than(&b.singleton(ty, 0), &x);
        let conjunction = b.logical_and(&b.logical_and(&a, &c), &d);
        let conjuncts = BooleanFormula::split_conjunctions(&conjunction);
        assert_eq!(conjuncts, vec![a, c, d]);
        assert_eq!(conjunction.variables().len(), 2);
    }

    #[test]
    fn rendering() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = b.variable(ty, MemoryLocation::scoped("main", "x"));
        let sum = b.add(&x, &b.singleton(ty, 1));
        assert_eq!(sum.to_string(), "(main::x + 1)");
        let cast = b.cast(TypeInfo::signed(64), &sum);
        assert_eq!(cast.to_string(), "((i64) (main::x + 1))");
        let cmp = b.less_than(&sum, &b.singleton(ty, 10));
        assert_eq!(cmp.to_string(), "((main::x + 1) < 10)");
        assert_eq!(
            b.logical_not(&cmp).to_string(),
            "!((main::x + 1) < 10)"
        );
    }
}
