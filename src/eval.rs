//! Formula evaluation over environments: exact, coarsened, three-valued
//! boolean, partial folding, and assumption pushing.

use crate::bitvector::TypeInfo;
use crate::compound::CompoundInterval;
use crate::environment::Environment;
use crate::formula::{BooleanFormula, FormulaBuilder, NumeralFormula};
use crate::interval::SimpleInterval;
use crate::manager::{
    CompoundIntervalManager, CompoundIntervalManagerFactory, IgnoreOverflows,
};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::sync::Arc;

/// Evaluates a formula to the set of values it may take in `environment`.
///
/// Unbound variables contribute every value of their type. Termination
/// follows from the environment's acyclicity.
pub fn evaluate(
    formula: &NumeralFormula,
    environment: &Environment,
    factory: &CompoundIntervalManagerFactory,
) -> CompoundInterval {
    evaluate_with(formula, environment, factory, false)
}

/// Evaluates a formula, coarsening every arithmetic intermediate to the
/// sign information it carries.
///
/// The result is a superset of [`evaluate`]'s and reaches a fixed point
/// quickly under repeated re-evaluation, which is what the widening
/// machinery needs.
pub fn evaluate_abstractly(
    formula: &NumeralFormula,
    environment: &Environment,
    factory: &CompoundIntervalManagerFactory,
) -> CompoundInterval {
    evaluate_with(formula, environment, factory, true)
}

type BinaryOp =
    fn(&CompoundIntervalManager, &CompoundInterval, &CompoundInterval) -> CompoundInterval;

fn evaluate_with(
    formula: &NumeralFormula,
    environment: &Environment,
    factory: &CompoundIntervalManagerFactory,
    abstracting: bool,
) -> CompoundInterval {
    let coarsen = |value: CompoundInterval| {
        if abstracting {
            abstraction_of(&value)
        } else {
            value
        }
    };
    let binary =
        |manager: &CompoundIntervalManager, op1: &NumeralFormula, op2: &NumeralFormula, op: BinaryOp| {
            op(
                manager,
                &evaluate_with(op1, environment, factory, abstracting),
                &evaluate_with(op2, environment, factory, abstracting),
            )
        };
    match formula {
        NumeralFormula::Constant { value, .. } => value.clone(),
        NumeralFormula::Variable {
            type_info,
            location,
        } => match environment.get(location) {
            Some(bound) => evaluate_with(bound, environment, factory, abstracting),
            None => type_info.all_possible_values(),
        },
        NumeralFormula::Add {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::add))
        }
        NumeralFormula::Multiply {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::multiply))
        }
        NumeralFormula::Divide {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::divide))
        }
        NumeralFormula::Modulo {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::modulo))
        }
        NumeralFormula::BinaryAnd {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::binary_and))
        }
        NumeralFormula::BinaryOr {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::binary_or))
        }
        NumeralFormula::BinaryXor {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::binary_xor))
        }
        NumeralFormula::ShiftLeft {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::shift_left))
        }
        NumeralFormula::ShiftRight {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            coarsen(binary(&manager, op1, op2, CompoundIntervalManager::shift_right))
        }
        NumeralFormula::Union {
            type_info,
            op1,
            op2,
        } => {
            let manager = factory.create_manager(*type_info);
            binary(&manager, op1, op2, CompoundIntervalManager::union)
        }
        NumeralFormula::Exclusion {
            type_info,
            excluded,
        } => {
            let manager = factory.create_manager(*type_info);
            manager.invert(&evaluate_with(excluded, environment, factory, abstracting))
        }
        NumeralFormula::Cast { type_info, operand } => {
            let manager = factory.create_manager(*type_info);
            manager.cast(
                operand.type_info(),
                &evaluate_with(operand, environment, factory, abstracting),
            )
        }
    }
}

/// Keeps only what a value set says about its sign.
///
/// Bottom and singletons are kept exactly; everything else widens to
/// "non-negative", "non-positive" or "anything".
pub fn abstraction_of(value: &CompoundInterval) -> CompoundInterval {
    if value.is_bottom() || value.is_singleton() {
        return value.clone();
    }
    let lower = match value.lower_bound() {
        Some(lower) if !lower.is_negative() => Some(BigInt::zero()),
        _ => None,
    };
    let upper = match value.upper_bound() {
        Some(upper) if !upper.is_positive() => Some(BigInt::zero()),
        _ => None,
    };
    let interval = match (lower, upper) {
        (Some(lower), Some(upper)) => SimpleInterval::of(lower, upper),
        (Some(lower), None) => SimpleInterval::greater_or_equal(lower),
        (None, Some(upper)) => SimpleInterval::less_or_equal(upper),
        (None, None) => SimpleInterval::infinite(),
    };
    CompoundInterval::of(interval)
}

/// Evaluates a boolean formula to its three-valued encoding: the singleton
/// zero for "definitely false", the complement of zero for "definitely
/// true", top for "unknown" and bottom for "unreachable".
pub fn evaluate_boolean(
    formula: &BooleanFormula,
    environment: &Environment,
    factory: &CompoundIntervalManagerFactory,
) -> CompoundInterval {
    match formula {
        BooleanFormula::Constant(value) => CompoundInterval::from_bool(*value),
        BooleanFormula::Equal { op1, op2 } => {
            let manager = factory.create_manager(op1.type_info());
            manager.equal(
                &evaluate(op1, environment, factory),
                &evaluate(op2, environment, factory),
            )
        }
        BooleanFormula::LessThan { op1, op2 } => {
            let manager = factory.create_manager(op1.type_info());
            manager.less_than(
                &evaluate(op1, environment, factory),
                &evaluate(op2, environment, factory),
            )
        }
        BooleanFormula::LogicalAnd { op1, op2 } => and3(
            evaluate_boolean(op1, environment, factory),
            evaluate_boolean(op2, environment, factory),
        ),
        BooleanFormula::LogicalNot { op } => not3(evaluate_boolean(op, environment, factory)),
    }
}

fn and3(a: CompoundInterval, b: CompoundInterval) -> CompoundInterval {
    if a.is_bottom() || b.is_bottom() {
        return CompoundInterval::bottom();
    }
    if a.is_definitely_false() || b.is_definitely_false() {
        return CompoundInterval::logical_false();
    }
    if a.is_definitely_true() && b.is_definitely_true() {
        return CompoundInterval::logical_true();
    }
    CompoundInterval::top()
}

fn not3(a: CompoundInterval) -> CompoundInterval {
    if a.is_bottom() {
        return CompoundInterval::bottom();
    }
    if a.is_definitely_true() {
        return CompoundInterval::logical_false();
    }
    if a.is_definitely_false() {
        return CompoundInterval::logical_true();
    }
    CompoundInterval::top()
}

/// Replaces every subtree that evaluates to a single value by that value
/// and folds what the builder can fold, without changing the formula's
/// meaning in `environment`
pub fn partial_evaluate(
    formula: &Arc<NumeralFormula>,
    environment: &Environment,
    builder: &FormulaBuilder,
) -> Arc<NumeralFormula> {
    let value = evaluate(formula, environment, builder.factory());
    if value.is_singleton() {
        return builder.constant(formula.type_info(), value);
    }
    match formula.as_ref() {
        NumeralFormula::Constant { .. } | NumeralFormula::Variable { .. } => Arc::clone(formula),
        NumeralFormula::Add { op1, op2, .. } => builder.add(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::Multiply { op1, op2, .. } => builder.multiply(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::Divide { op1, op2, .. } => builder.divide(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::Modulo { op1, op2, .. } => builder.modulo(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::BinaryAnd { op1, op2, .. } => builder.binary_and(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::BinaryOr { op1, op2, .. } => builder.binary_or(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::BinaryXor { op1, op2, .. } => builder.binary_xor(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::ShiftLeft { op1, op2, .. } => builder.shift_left(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::ShiftRight { op1, op2, .. } => builder.shift_right(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::Union { op1, op2, .. } => builder.union(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        NumeralFormula::Exclusion { excluded, .. } => {
            builder.exclusion(&partial_evaluate(excluded, environment, builder))
        }
        NumeralFormula::Cast { type_info, operand } => {
            builder.cast(*type_info, &partial_evaluate(operand, environment, builder))
        }
    }
}

/// Folds a boolean formula as far as the environment permits
pub fn partial_evaluate_boolean(
    formula: &Arc<BooleanFormula>,
    environment: &Environment,
    builder: &FormulaBuilder,
) -> Arc<BooleanFormula> {
    let value = evaluate_boolean(formula, environment, builder.factory());
    if value.is_definitely_true() {
        return builder.boolean_constant(true);
    }
    if value.is_definitely_false() {
        return builder.boolean_constant(false);
    }
    match formula.as_ref() {
        BooleanFormula::Constant(_) => Arc::clone(formula),
        BooleanFormula::Equal { op1, op2 } => builder.equal(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        BooleanFormula::LessThan { op1, op2 } => builder.less_than(
            &partial_evaluate(op1, environment, builder),
            &partial_evaluate(op2, environment, builder),
        ),
        BooleanFormula::LogicalAnd { op1, op2 } => builder.logical_and(
            &partial_evaluate_boolean(op1, environment, builder),
            &partial_evaluate_boolean(op2, environment, builder),
        ),
        BooleanFormula::LogicalNot { op } => {
            builder.logical_not(&partial_evaluate_boolean(op, environment, builder))
        }
    }
}

/// Refines an environment under the assumption that `formula` has the truth
/// value `assumed`.
///
/// Returns `None` when the assumption contradicts the environment, meaning
/// the assumed branch is unreachable.
pub fn push_assumption(
    environment: &Environment,
    builder: &FormulaBuilder,
    formula: &Arc<BooleanFormula>,
    assumed: bool,
) -> Option<Environment> {
    let factory = builder.factory();
    match formula.as_ref() {
        BooleanFormula::Constant(value) => {
            if *value == assumed {
                Some(environment.clone())
            } else {
                None
            }
        }
        BooleanFormula::LogicalNot { op } => push_assumption(environment, builder, op, !assumed),
        BooleanFormula::LogicalAnd { op1, op2 } => {
            if assumed {
                let refined = push_assumption(environment, builder, op1, true)?;
                push_assumption(&refined, builder, op2, true)
            } else {
                // the negation is a disjunction; only an outright
                // contradiction can be concluded
                if evaluate_boolean(formula, environment, factory).is_definitely_true() {
                    None
                } else {
                    Some(environment.clone())
                }
            }
        }
        BooleanFormula::Equal { op1, op2 } => {
            let manager = factory.create_manager(op1.type_info());
            let v1 = evaluate(op1, environment, factory);
            let v2 = evaluate(op2, environment, factory);
            if v1.is_bottom() || v2.is_bottom() {
                return None;
            }
            if assumed {
                let meet = manager.intersect(&v1, &v2);
                if meet.is_bottom() {
                    return None;
                }
                let refined = push_value(environment, builder, op1, &meet)?;
                push_value(&refined, builder, op2, &meet)
            } else {
                if manager.equal(&v1, &v2).is_definitely_true() {
                    return None;
                }
                let mut current = environment.clone();
                if v2.is_singleton() {
                    let narrowed = manager.intersect(&v1, &manager.invert(&v2));
                    if narrowed.is_bottom() {
                        return None;
                    }
                    current = push_value(&current, builder, op1, &narrowed)?;
                }
                if v1.is_singleton() {
                    let narrowed = manager.intersect(&v2, &manager.invert(&v1));
                    if narrowed.is_bottom() {
                        return None;
                    }
                    current = push_value(&current, builder, op2, &narrowed)?;
                }
                Some(current)
            }
        }
        BooleanFormula::LessThan { op1, op2 } => {
            let manager = factory.create_manager(op1.type_info());
            let v1 = evaluate(op1, environment, factory);
            let v2 = evaluate(op2, environment, factory);
            if v1.is_bottom() || v2.is_bottom() {
                return None;
            }
            if assumed {
                if manager.less_than(&v1, &v2).is_definitely_false() {
                    return None;
                }
                let mut current = environment.clone();
                if let Some(upper) = v2.upper_bound() {
                    let limit = CompoundInterval::of(SimpleInterval::less_or_equal(
                        upper - BigInt::from(1),
                    ));
                    current = push_value(&current, builder, op1, &v1.intersect_with(&limit))?;
                }
                if let Some(lower) = v1.lower_bound() {
                    let limit = CompoundInterval::of(SimpleInterval::greater_or_equal(
                        lower + BigInt::from(1),
                    ));
                    current = push_value(&current, builder, op2, &v2.intersect_with(&limit))?;
                }
                Some(current)
            } else {
                if manager.greater_or_equal(&v1, &v2).is_definitely_false() {
                    return None;
                }
                let mut current = environment.clone();
                if let Some(lower) = v2.lower_bound() {
                    let limit =
                        CompoundInterval::of(SimpleInterval::greater_or_equal(lower.clone()));
                    current = push_value(&current, builder, op1, &v1.intersect_with(&limit))?;
                }
                if let Some(upper) = v1.upper_bound() {
                    let limit = CompoundInterval::of(SimpleInterval::less_or_equal(upper.clone()));
                    current = push_value(&current, builder, op2, &v2.intersect_with(&limit))?;
                }
                Some(current)
            }
        }
    }
}

/// Refines an environment with the knowledge that `formula` evaluates to a
/// value in `value`.
///
/// Knowledge is propagated into variables and through invertible
/// operations; everything else is checked for consistency only. Returns
/// `None` on contradiction.
pub fn push_value(
    environment: &Environment,
    builder: &FormulaBuilder,
    formula: &Arc<NumeralFormula>,
    value: &CompoundInterval,
) -> Option<Environment> {
    if value.is_bottom() {
        return None;
    }
    let factory = builder.factory();
    let type_info = formula.type_info();
    let manager = factory.create_manager(type_info);
    let current = evaluate(formula, environment, factory);
    let meet = manager.intersect(&current, value);
    if meet.is_bottom() {
        return None;
    }
    if meet == current {
        return Some(environment.clone());
    }
    match formula.as_ref() {
        NumeralFormula::Constant { .. } => Some(environment.clone()),
        NumeralFormula::Variable { location, .. } => match environment.get(location) {
            None => Some(environment.define(
                location.clone(),
                builder.constant(type_info, meet),
                builder,
            )),
            Some(bound) => {
                let bound = Arc::clone(bound);
                match bound.as_ref() {
                    NumeralFormula::Constant { .. } => Some(environment.define(
                        location.clone(),
                        builder.constant(type_info, meet),
                        builder,
                    )),
                    _ => push_value(environment, builder, &bound, &meet),
                }
            }
        },
        NumeralFormula::Add { op1, op2, .. } => {
            // addition is invertible modulo the type size, so the wrapped
            // difference is sound under either overflow policy
            let wrapping = wrapping_manager(type_info);
            let other = evaluate(op2, environment, factory);
            let refined = push_value(
                environment,
                builder,
                op1,
                &wrapping.add(&meet, &wrapping.negate(&other)),
            )?;
            let other = evaluate(op1, &refined, factory);
            push_value(
                &refined,
                builder,
                op2,
                &wrapping.add(&meet, &wrapping.negate(&other)),
            )
        }
        NumeralFormula::Multiply { op1, op2, .. } => {
            // negation is its own inverse modulo the type size, so a factor
            // of -1 can be pushed through; other factors are left alone
            let minus_one = CompoundInterval::of(SimpleInterval::singleton(-1));
            let wrapping = wrapping_manager(type_info);
            if matches!(op2.as_ref(), NumeralFormula::Constant { value, .. } if *value == minus_one)
            {
                push_value(environment, builder, op1, &wrapping.negate(&meet))
            } else if matches!(op1.as_ref(), NumeralFormula::Constant { value, .. } if *value == minus_one)
            {
                push_value(environment, builder, op2, &wrapping.negate(&meet))
            } else {
                Some(environment.clone())
            }
        }
        NumeralFormula::Cast { operand, .. } => {
            if cast_preserves(operand.type_info(), type_info) {
                push_value(environment, builder, operand, &meet)
            } else {
                Some(environment.clone())
            }
        }
        _ => Some(environment.clone()),
    }
}

fn wrapping_manager(type_info: TypeInfo) -> CompoundIntervalManager {
    CompoundIntervalManagerFactory::new(true, Arc::new(IgnoreOverflows)).create_manager(type_info)
}

/// Whether every value of `from` maps to itself when cast to `to`
fn cast_preserves(from: TypeInfo, to: TypeInfo) -> bool {
    match (from.bit_vector(), to.bit_vector()) {
        (Some(from), Some(to)) => {
            to.min_value() <= from.min_value() && to.max_value() >= from.max_value()
        }
        _ => false,
    }
}
