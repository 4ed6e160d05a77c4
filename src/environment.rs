//! Persistent map from variables to the formulas describing their values.

use crate::bitvector::TypeInfo;
use crate::eval::evaluate;
use crate::formula::{FormulaBuilder, MemoryLocation, NumeralFormula};
use im::OrdMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// An acyclic binding of variables to formulas.
///
/// Bindings may refer to other bound variables but never, directly or
/// through other bindings, back to themselves; [`Environment::define`]
/// maintains that invariant by collapsing an offending formula to the
/// constant it currently evaluates to. Lookups during evaluation therefore
/// always terminate.
///
/// The map is persistent; definitions return a new environment sharing
/// structure with the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    bindings: OrdMap<MemoryLocation, Arc<NumeralFormula>>,
}

impl Environment {
    /// The empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// The formula bound to `location`, if any
    pub fn get(&self, location: &MemoryLocation) -> Option<&Arc<NumeralFormula>> {
        self.bindings.get(location)
    }

    /// Whether `location` is bound
    pub fn contains(&self, location: &MemoryLocation) -> bool {
        self.bindings.contains_key(location)
    }

    /// The binding of `location`, or the constant covering every value of
    /// `type_info` when unbound
    pub fn resolve(
        &self,
        location: &MemoryLocation,
        type_info: TypeInfo,
        builder: &FormulaBuilder,
    ) -> Arc<NumeralFormula> {
        match self.bindings.get(location) {
            Some(bound) => Arc::clone(bound),
            None => builder.constant(type_info, type_info.all_possible_values()),
        }
    }

    /// Number of bound variables
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no variable is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates over the bindings in variable order
    pub fn iter(&self) -> impl Iterator<Item = (&MemoryLocation, &Arc<NumeralFormula>)> {
        self.bindings.iter()
    }

    /// Iterates over the bound variables in order
    pub fn locations(&self) -> impl Iterator<Item = &MemoryLocation> {
        self.bindings.keys()
    }

    /// Binds `location` to `formula`.
    ///
    /// When the binding would close a reference cycle the formula is
    /// replaced by the constant set it evaluates to in the current
    /// environment, which preserves its meaning at definition time.
    ///
    /// Constants covering the whole type are not stored; an unbound
    /// variable already means any value of its type.
    pub fn define(
        &self,
        location: MemoryLocation,
        formula: Arc<NumeralFormula>,
        builder: &FormulaBuilder,
    ) -> Environment {
        let formula = if self.would_cycle(&location, &formula) {
            let value = evaluate(&formula, self, builder.factory());
            builder.constant(formula.type_info(), value)
        } else {
            formula
        };
        if let NumeralFormula::Constant { type_info, value } = formula.as_ref() {
            if value.contains(&type_info.all_possible_values()) {
                return self.remove(&location);
            }
        }
        Environment {
            bindings: self.bindings.update(location, formula),
        }
    }

    /// Drops the binding of `location`, if any
    pub fn remove(&self, location: &MemoryLocation) -> Environment {
        Environment {
            bindings: self.bindings.without(location),
        }
    }

    /// Whether binding `location` to `formula` would make some binding
    /// reachable from itself
    fn would_cycle(&self, location: &MemoryLocation, formula: &NumeralFormula) -> bool {
        let mut pending: Vec<MemoryLocation> = formula.variables().into_iter().collect();
        let mut visited = BTreeSet::new();
        while let Some(variable) = pending.pop() {
            if variable == *location {
                return true;
            }
            if !visited.insert(variable.clone()) {
                continue;
            }
            if let Some(bound) = self.bindings.get(&variable) {
                for nested in bound.variables() {
                    if !visited.contains(&nested) {
                        pending.push(nested);
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitvector::TypeInfo;
    use crate::compound::CompoundInterval;
    use crate::interval::SimpleInterval;
    use crate::manager::CompoundIntervalManagerFactory;

    fn builder() -> FormulaBuilder {
        FormulaBuilder::new(CompoundIntervalManagerFactory::default())
    }

    #[test]
    fn define_and_remove() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = MemoryLocation::new("x");
        let env = Environment::new().define(x.clone(), b.singleton(ty, 3), &b);
        assert!(env.contains(&x));
        assert_eq!(env.len(), 1);
        assert_eq!(&env.resolve(&x, ty, &b), env.get(&x).unwrap());
        let env = env.remove(&x);
        assert!(env.is_empty());
        // unbound variables resolve to their whole type
        match env.resolve(&x, ty, &b).as_ref() {
            NumeralFormula::Constant { value, .. } => {
                assert_eq!(value, &ty.all_possible_values());
            }
            other => panic!("expected a constant, got {other:?}"),
        }
    }

    #[test]
    fn full_ranges_are_not_stored() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = MemoryLocation::new("x");
        let env =
            Environment::new().define(x.clone(), b.constant(ty, ty.all_possible_values()), &b);
        assert!(env.is_empty());
    }

    #[test]
    fn definitions_share_structure() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = MemoryLocation::new("x");
        let base = Environment::new().define(x.clone(), b.singleton(ty, 3), &b);
        let derived = base.define(MemoryLocation::new("y"), b.singleton(ty, 4), &b);
        assert_eq!(base.len(), 1);
        assert_eq!(derived.len(), 2);
        assert_eq!(base.get(&x), derived.get(&x));
    }

    #[test]
    fn cycles_collapse_to_constants() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = MemoryLocation::new("x");
        let y = MemoryLocation::new("y");
        let env = Environment::new().define(
            x.clone(),
            b.add(&b.variable(ty, y.clone()), &b.singleton(ty, 1)),
            &b,
        );
        // y := x + 1 would close the loop x -> y -> x
        let env = env.define(
            y.clone(),
            b.add(&b.variable(ty, x.clone()), &b.singleton(ty, 1)),
            &b,
        );
        // x evaluated to any i32, so x + 1 collapsed to the whole type,
        // and full-range constants are not worth keeping
        assert!(!env.contains(&y));
        assert!(env.contains(&x));
    }

    #[test]
    fn bounded_cycle_keeps_known_values() {
        let b = builder();
        let ty = TypeInfo::signed(32);
        let x = MemoryLocation::new("x");
        let env = Environment::new().define(
            x.clone(),
            b.constant(ty, CompoundInterval::of(SimpleInterval::of(0, 9))),
            &b,
        );
        let env = env.define(
            x.clone(),
            b.add(&b.variable(ty, x.clone()), &b.singleton(ty, 1)),
            &b,
        );
        match env.get(&x).map(Arc::as_ref) {
            Some(NumeralFormula::Constant { value, .. }) => {
                assert_eq!(value, &CompoundInterval::of(SimpleInterval::of(1, 10)));
            }
            other => panic!("expected a collapsed constant, got {other:?}"),
        }
    }
}
