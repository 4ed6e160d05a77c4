//! Translates edge expressions into formulas and reports which variables
//! an edge touches.

use crate::bitvector::TypeInfo;
use crate::cfg::{CfaEdge, EdgeKind};
use crate::compound::CompoundInterval;
use crate::expr::{BinaryOperator, Expression, UnaryOperator};
use crate::formula::{BooleanFormula, FormulaBuilder, MemoryLocation, NumeralFormula};
use crate::interval::SimpleInterval;
use num_traits::Zero;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bridges the source-level view of an edge and the formula world.
///
/// Conversion is total: reads the analysis cannot track become variables
/// with marker names, boolean operators in value position become the value
/// set `{0, 1}`. Precision is lost at those points, soundness is not.
#[derive(Debug, Clone)]
pub struct EdgeAnalyzer {
    builder: FormulaBuilder,
}

impl EdgeAnalyzer {
    /// An analyzer translating through the given builder
    pub fn new(builder: FormulaBuilder) -> Self {
        Self { builder }
    }

    /// The builder translations go through
    pub fn builder(&self) -> &FormulaBuilder {
        &self.builder
    }

    /// The numeral formula an expression evaluates like
    pub fn numeral_formula_of(&self, expression: &Expression) -> Arc<NumeralFormula> {
        let type_info = expression.type_info();
        match expression {
            Expression::Literal { value, .. } => {
                self.builder.singleton(type_info, value.clone())
            }
            Expression::Variable { location, .. } => {
                self.builder.variable(type_info, location.clone())
            }
            Expression::Unary {
                operator, operand, ..
            } => {
                let operand = self
                    .builder
                    .cast(type_info, &self.numeral_formula_of(operand));
                match operator {
                    UnaryOperator::Minus => self.builder.negate(&operand),
                    UnaryOperator::BitNot => self
                        .builder
                        .subtract(&self.builder.negate(&operand), &self.builder.singleton(type_info, 1)),
                    UnaryOperator::Not => self.truth_value(type_info),
                }
            }
            Expression::Binary {
                operator, op1, op2, ..
            } => {
                let a = self.builder.cast(type_info, &self.numeral_formula_of(op1));
                let b = self.builder.cast(type_info, &self.numeral_formula_of(op2));
                match operator {
                    BinaryOperator::Add => self.builder.add(&a, &b),
                    BinaryOperator::Subtract => self.builder.subtract(&a, &b),
                    BinaryOperator::Multiply => self.builder.multiply(&a, &b),
                    BinaryOperator::Divide => self.builder.divide(&a, &b),
                    BinaryOperator::Modulo => self.builder.modulo(&a, &b),
                    BinaryOperator::BitAnd => self.builder.binary_and(&a, &b),
                    BinaryOperator::BitOr => self.builder.binary_or(&a, &b),
                    BinaryOperator::BitXor => self.builder.binary_xor(&a, &b),
                    BinaryOperator::ShiftLeft => self.builder.shift_left(&a, &b),
                    BinaryOperator::ShiftRight => self.builder.shift_right(&a, &b),
                    BinaryOperator::Equal
                    | BinaryOperator::NotEqual
                    | BinaryOperator::LessThan
                    | BinaryOperator::LessOrEqual
                    | BinaryOperator::GreaterThan
                    | BinaryOperator::GreaterOrEqual
                    | BinaryOperator::LogicalAnd
                    | BinaryOperator::LogicalOr => self.truth_value(type_info),
                }
            }
            Expression::Cast { operand, .. } => self
                .builder
                .cast(type_info, &self.numeral_formula_of(operand)),
            Expression::ArrayElement { .. }
            | Expression::FieldAccess { .. }
            | Expression::Dereference { .. } => match expression.memory_location() {
                Some(location) => self.builder.variable(type_info, location),
                None => self
                    .builder
                    .constant(type_info, type_info.all_possible_values()),
            },
        }
    }

    /// The boolean formula an expression decides like.
    ///
    /// Value-typed expressions are compared against zero, following the
    /// source language's truth convention.
    pub fn boolean_formula_of(&self, expression: &Expression) -> Arc<BooleanFormula> {
        match expression {
            Expression::Literal { value, .. } => self.builder.boolean_constant(!value.is_zero()),
            Expression::Unary {
                operator: UnaryOperator::Not,
                operand,
                ..
            } => self.builder.logical_not(&self.boolean_formula_of(operand)),
            Expression::Binary {
                operator, op1, op2, ..
            } => {
                let comparison = |swap: bool| {
                    let mut a = self.numeral_formula_of(op1);
                    let mut b = self.builder.cast(a.type_info(), &self.numeral_formula_of(op2));
                    if swap {
                        std::mem::swap(&mut a, &mut b);
                    }
                    (a, b)
                };
                match operator {
                    BinaryOperator::Equal => {
                        let (a, b) = comparison(false);
                        self.builder.equal(&a, &b)
                    }
                    BinaryOperator::NotEqual => {
                        let (a, b) = comparison(false);
                        self.builder.not_equal(&a, &b)
                    }
                    BinaryOperator::LessThan => {
                        let (a, b) = comparison(false);
                        self.builder.less_than(&a, &b)
                    }
                    BinaryOperator::LessOrEqual => {
                        let (a, b) = comparison(false);
                        self.builder.less_or_equal(&a, &b)
                    }
                    BinaryOperator::GreaterThan => {
                        let (a, b) = comparison(true);
                        self.builder.less_than(&a, &b)
                    }
                    BinaryOperator::GreaterOrEqual => {
                        let (a, b) = comparison(true);
                        self.builder.less_or_equal(&a, &b)
                    }
                    BinaryOperator::LogicalAnd => self.builder.logical_and(
                        &self.boolean_formula_of(op1),
                        &self.boolean_formula_of(op2),
                    ),
                    BinaryOperator::LogicalOr => self.builder.logical_or(
                        &self.boolean_formula_of(op1),
                        &self.boolean_formula_of(op2),
                    ),
                    _ => self.nonzero(expression),
                }
            }
            _ => self.nonzero(expression),
        }
    }

    /// The variables an edge reads or writes, with their types
    pub fn involved_variable_types(&self, edge: &CfaEdge) -> BTreeMap<MemoryLocation, TypeInfo> {
        let mut involved = BTreeMap::new();
        match &edge.kind {
            EdgeKind::Blank => {}
            EdgeKind::Assume { condition, .. } => collect_locations(condition, &mut involved),
            EdgeKind::Declaration {
                variable,
                type_info,
                initializer,
            } => {
                involved.insert(variable.clone(), *type_info);
                if let Some(initializer) = initializer {
                    collect_locations(initializer, &mut involved);
                }
            }
            EdgeKind::Statement { lhs, rhs } => {
                collect_locations(lhs, &mut involved);
                collect_locations(rhs, &mut involved);
            }
            EdgeKind::FunctionCall { parameters, .. } => {
                for (parameter, argument) in parameters {
                    involved.insert(parameter.clone(), argument.type_info());
                    collect_locations(argument, &mut involved);
                }
            }
            EdgeKind::FunctionReturn { assignment, .. } => {
                if let Some((target, value)) = assignment {
                    involved.insert(target.clone(), value.type_info());
                    collect_locations(value, &mut involved);
                }
            }
        }
        involved
    }

    fn truth_value(&self, type_info: TypeInfo) -> Arc<NumeralFormula> {
        self.builder.constant(
            type_info,
            CompoundInterval::of(SimpleInterval::of(0, 1)),
        )
    }

    fn nonzero(&self, expression: &Expression) -> Arc<BooleanFormula> {
        let value = self.numeral_formula_of(expression);
        let zero = self.builder.singleton(value.type_info(), 0);
        self.builder.not_equal(&value, &zero)
    }
}

fn collect_locations(expression: &Expression, into: &mut BTreeMap<MemoryLocation, TypeInfo>) {
    match expression {
        Expression::Literal { .. } => {}
        Expression::Variable {
            type_info,
            location,
        } => {
            into.insert(location.clone(), *type_info);
        }
        Expression::Unary { operand, .. } | Expression::Cast { operand, .. } => {
            collect_locations(operand, into);
        }
        Expression::Binary { op1, op2, .. } => {
            collect_locations(op1, into);
            collect_locations(op2, into);
        }
        Expression::ArrayElement { array, index, .. } => {
            if let Some(location) = expression.memory_location() {
                into.insert(location, expression.type_info());
            }
            collect_locations(array, into);
            collect_locations(index, into);
        }
        Expression::FieldAccess { target, .. } => {
            if let Some(location) = expression.memory_location() {
                into.insert(location, expression.type_info());
            }
            collect_locations(target, into);
        }
        Expression::Dereference { operand, .. } => {
            if let Some(location) = expression.memory_location() {
                into.insert(location, expression.type_info());
            }
            collect_locations(operand, into);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{EdgeId, LocationId};
    use crate::manager::CompoundIntervalManagerFactory;
    use num_bigint::BigInt;

    fn analyzer() -> EdgeAnalyzer {
        EdgeAnalyzer::new(FormulaBuilder::new(CompoundIntervalManagerFactory::default()))
    }

    fn int_var(name: &str) -> Expression {
        Expression::Variable {
            type_info: TypeInfo::signed(32),
            location: MemoryLocation::new(name),
        }
    }

    fn int_literal(value: i64) -> Expression {
        Expression::Literal {
            type_info: TypeInfo::signed(32),
            value: BigInt::from(value),
        }
    }

    #[test]
    fn arithmetic_translates_structurally() {
        let a = analyzer();
        let sum = Expression::Binary {
            type_info: TypeInfo::signed(32),
            operator: BinaryOperator::Add,
            op1: Box::new(int_var("x")),
            op2: Box::new(int_literal(1)),
        };
        assert_eq!(a.numeral_formula_of(&sum).to_string(), "(x + 1)");
        let difference = Expression::Binary {
            type_info: TypeInfo::signed(32),
            operator: BinaryOperator::Subtract,
            op1: Box::new(int_var("x")),
            op2: Box::new(int_literal(3)),
        };
        assert_eq!(
            a.numeral_formula_of(&difference).to_string(),
            "(x + -3)"
        );
    }

    #[test]
    fn untracked_reads_become_markers() {
        let a = analyzer();
        let element = Expression::ArrayElement {
            type_info: TypeInfo::signed(32),
            array: Box::new(int_var("buf")),
            index: Box::new(int_var("i")),
        };
        let formula = a.numeral_formula_of(&element);
        match formula.as_ref() {
            NumeralFormula::Variable { location, .. } => {
                assert!(location.is_unsupported_form());
            }
            other => panic!("expected a marker variable, got {other:?}"),
        }
    }

    #[test]
    fn conditions_translate_to_boolean_formulas() {
        let a = analyzer();
        let condition = Expression::Binary {
            type_info: TypeInfo::signed(32),
            operator: BinaryOperator::GreaterOrEqual,
            op1: Box::new(int_var("x")),
            op2: Box::new(int_literal(10)),
        };
        assert_eq!(
            a.boolean_formula_of(&condition).to_string(),
            "!(x < 10)"
        );
        let truthy = a.boolean_formula_of(&int_var("x"));
        assert_eq!(truthy.to_string(), "!(x == 0)");
        assert_eq!(
            a.boolean_formula_of(&int_literal(0)).as_ref(),
            &BooleanFormula::Constant(false)
        );
    }

    #[test]
    fn involved_variables_carry_types() {
        let a = analyzer();
        let edge = CfaEdge {
            id: EdgeId(0),
            predecessor: LocationId(0),
            successor: LocationId(1),
            kind: EdgeKind::Statement {
                lhs: int_var("x"),
                rhs: Expression::Binary {
                    type_info: TypeInfo::signed(32),
                    operator: BinaryOperator::Multiply,
                    op1: Box::new(int_var("y")),
                    op2: Box::new(int_var("z")),
                },
            },
        };
        let involved = a.involved_variable_types(&edge);
        assert_eq!(involved.len(), 3);
        assert_eq!(
            involved.get(&MemoryLocation::new("y")),
            Some(&TypeInfo::signed(32))
        );
    }
}
