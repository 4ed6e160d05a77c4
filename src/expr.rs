//! Source-level expressions as they appear on control-flow edges.

use crate::bitvector::TypeInfo;
use crate::formula::MemoryLocation;
use num_bigint::BigInt;

/// Operators with one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnaryOperator {
    /// Arithmetic negation
    Minus,
    /// Bitwise complement
    BitNot,
    /// Logical negation
    Not,
}

/// Operators with two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinaryOperator {
    /// Sum
    Add,
    /// Difference
    Subtract,
    /// Product
    Multiply,
    /// Truncated quotient
    Divide,
    /// Truncated remainder
    Modulo,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Bitwise exclusive or
    BitXor,
    /// Left shift
    ShiftLeft,
    /// Arithmetic right shift
    ShiftRight,
    /// Equality
    Equal,
    /// Inequality
    NotEqual,
    /// Strict order
    LessThan,
    /// Non-strict order
    LessOrEqual,
    /// Strict order, swapped
    GreaterThan,
    /// Non-strict order, swapped
    GreaterOrEqual,
    /// Short-circuit conjunction
    LogicalAnd,
    /// Short-circuit disjunction
    LogicalOr,
}

/// An expression tree, annotated with the type each node evaluates in
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expression {
    /// An integer literal
    Literal {
        /// Type of the literal
        type_info: TypeInfo,
        /// Its value
        value: BigInt,
    },
    /// A plain variable
    Variable {
        /// Declared type
        type_info: TypeInfo,
        /// The variable
        location: MemoryLocation,
    },
    /// Application of a unary operator
    Unary {
        /// Result type
        type_info: TypeInfo,
        /// The operator
        operator: UnaryOperator,
        /// Its operand
        operand: Box<Expression>,
    },
    /// Application of a binary operator
    Binary {
        /// Result type
        type_info: TypeInfo,
        /// The operator
        operator: BinaryOperator,
        /// Left operand
        op1: Box<Expression>,
        /// Right operand
        op2: Box<Expression>,
    },
    /// Explicit conversion
    Cast {
        /// Target type
        type_info: TypeInfo,
        /// Converted operand
        operand: Box<Expression>,
    },
    /// Subscript into an array
    ArrayElement {
        /// Element type
        type_info: TypeInfo,
        /// The array
        array: Box<Expression>,
        /// The subscript
        index: Box<Expression>,
    },
    /// Access to a member of a structure
    FieldAccess {
        /// Field type
        type_info: TypeInfo,
        /// The structure, or a pointer to it
        target: Box<Expression>,
        /// Name of the field
        field: String,
        /// Whether the access goes through a pointer
        through_pointer: bool,
    },
    /// Read through a pointer
    Dereference {
        /// Pointed-to type
        type_info: TypeInfo,
        /// The pointer
        operand: Box<Expression>,
    },
}

impl Expression {
    /// The type this expression evaluates in
    pub fn type_info(&self) -> TypeInfo {
        match self {
            Expression::Literal { type_info, .. }
            | Expression::Variable { type_info, .. }
            | Expression::Unary { type_info, .. }
            | Expression::Binary { type_info, .. }
            | Expression::Cast { type_info, .. }
            | Expression::ArrayElement { type_info, .. }
            | Expression::FieldAccess { type_info, .. }
            | Expression::Dereference { type_info, .. } => *type_info,
        }
    }

    /// The storage this expression designates, if it designates any.
    ///
    /// Plain variables and direct field accesses yield trackable
    /// locations. Array elements, accesses through pointers and
    /// dereferences yield marker names that
    /// [`MemoryLocation::is_unsupported_form`] recognizes.
    pub fn memory_location(&self) -> Option<MemoryLocation> {
        match self {
            Expression::Variable { location, .. } => Some(location.clone()),
            Expression::ArrayElement { array, .. } => array
                .memory_location()
                .map(|base| MemoryLocation::from(format!("{base}[]"))),
            Expression::FieldAccess {
                target,
                field,
                through_pointer,
                ..
            } => target.memory_location().map(|base| {
                if *through_pointer {
                    MemoryLocation::from(format!("{base}->{field}"))
                } else {
                    MemoryLocation::from(format!("{base}.{field}"))
                }
            }),
            Expression::Dereference { operand, .. } => operand
                .memory_location()
                .map(|base| MemoryLocation::from(format!("*{base}"))),
            _ => None,
        }
    }

    /// Whether this expression may stand on the left of an assignment
    pub fn is_lvalue(&self) -> bool {
        self.memory_location().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_var(name: &str) -> Expression {
        Expression::Variable {
            type_info: TypeInfo::signed(32),
            location: MemoryLocation::new(name),
        }
    }

    #[test]
    fn locations_of_lvalues() {
        assert_eq!(
            int_var("x").memory_location(),
            Some(MemoryLocation::new("x"))
        );
        let element = Expression::ArrayElement {
            type_info: TypeInfo::signed(32),
            array: Box::new(int_var("a")),
            index: Box::new(int_var("i")),
        };
        let marker = element.memory_location().unwrap();
        assert_eq!(marker.as_str(), "a[]");
        assert!(marker.is_unsupported_form());
        let direct = Expression::FieldAccess {
            type_info: TypeInfo::signed(32),
            target: Box::new(int_var("s")),
            field: "f".to_owned(),
            through_pointer: false,
        };
        assert_eq!(direct.memory_location().unwrap().as_str(), "s.f");
        assert!(!direct.memory_location().unwrap().is_unsupported_form());
        let indirect = Expression::FieldAccess {
            type_info: TypeInfo::signed(32),
            target: Box::new(int_var("p")),
            field: "f".to_owned(),
            through_pointer: true,
        };
        assert!(indirect.memory_location().unwrap().is_unsupported_form());
        let literal = Expression::Literal {
            type_info: TypeInfo::signed(32),
            value: BigInt::from(3),
        };
        assert!(!literal.is_lvalue());
    }
}
