//! The persistent abstract state tracked per program location.

use crate::abstraction::AbstractionState;
use crate::bitvector::TypeInfo;
use crate::compound::CompoundInterval;
use crate::environment::Environment;
use crate::eval::{
    evaluate, evaluate_abstractly, evaluate_boolean, partial_evaluate, partial_evaluate_boolean,
    push_assumption,
};
use crate::formula::{BooleanFormula, FormulaBuilder, MemoryLocation, NumeralFormula};
use crate::precision::InvariantsPrecision;
use im::{OrdMap, OrdSet};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Which variables a state keeps information about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableSelection {
    /// Information is kept about every variable
    All,
    /// Information is kept about these variables only
    Specified(OrdSet<MemoryLocation>),
}

impl VariableSelection {
    /// Whether information about `location` is kept
    pub fn contains(&self, location: &MemoryLocation) -> bool {
        match self {
            VariableSelection::All => true,
            VariableSelection::Specified(locations) => locations.contains(location),
        }
    }

    /// Accepts an assignment to a tracked target, growing the selection by
    /// the variables the assigned formula mentions. `None` means the
    /// assignment is not worth tracking.
    pub fn accept_assignment(
        &self,
        target: &MemoryLocation,
        formula: &NumeralFormula,
        limit: usize,
    ) -> Option<VariableSelection> {
        match self {
            VariableSelection::All => Some(VariableSelection::All),
            VariableSelection::Specified(locations) => {
                if !locations.contains(target) {
                    return None;
                }
                Some(self.grown_by(formula.variables(), limit))
            }
        }
    }

    /// Accepts an assumption mentioning at least one tracked variable,
    /// growing the selection by all variables it mentions. `None` means the
    /// assumption is about foreign variables only.
    pub fn accept_assumption(
        &self,
        formula: &BooleanFormula,
        limit: usize,
    ) -> Option<VariableSelection> {
        match self {
            VariableSelection::All => Some(VariableSelection::All),
            VariableSelection::Specified(locations) => {
                let mentioned = formula.variables();
                if mentioned.iter().any(|variable| locations.contains(variable)) {
                    Some(self.grown_by(mentioned, limit))
                } else {
                    None
                }
            }
        }
    }

    /// The least selection covering both operands
    pub fn join(&self, other: &VariableSelection) -> VariableSelection {
        match (self, other) {
            (VariableSelection::All, _) | (_, VariableSelection::All) => VariableSelection::All,
            (VariableSelection::Specified(a), VariableSelection::Specified(b)) => {
                VariableSelection::Specified(a.clone().union(b.clone()))
            }
        }
    }

    fn grown_by(&self, variables: BTreeSet<MemoryLocation>, limit: usize) -> VariableSelection {
        match self {
            VariableSelection::All => VariableSelection::All,
            VariableSelection::Specified(locations) => {
                let mut grown = locations.clone();
                for variable in variables {
                    if grown.len() >= limit && !grown.contains(&variable) {
                        continue;
                    }
                    grown.insert(variable);
                }
                VariableSelection::Specified(grown)
            }
        }
    }
}

/// An abstract state: an acyclic environment of variable definitions, a set
/// of assumptions known to hold, and the bookkeeping steering abstraction.
///
/// States are immutable; every operation returns a new state sharing
/// structure with the old one.
#[derive(Debug, Clone)]
pub struct InvariantsState {
    environment: Environment,
    assumptions: OrdSet<Arc<BooleanFormula>>,
    variable_selection: VariableSelection,
    variable_types: OrdMap<MemoryLocation, TypeInfo>,
    abstraction_state: AbstractionState,
    builder: FormulaBuilder,
    overflow_detected: bool,
    overapproximates_unsupported_feature: bool,
}

impl PartialEq for InvariantsState {
    fn eq(&self, other: &Self) -> bool {
        self.environment == other.environment
            && self.assumptions == other.assumptions
            && self.variable_selection == other.variable_selection
            && self.variable_types == other.variable_types
            && self.abstraction_state == other.abstraction_state
            && self.overflow_detected == other.overflow_detected
            && self.overapproximates_unsupported_feature
                == other.overapproximates_unsupported_feature
            && self.builder.factory() == other.builder.factory()
    }
}

impl Eq for InvariantsState {}

impl InvariantsState {
    /// A state knowing nothing, tracking every variable
    pub fn new(builder: FormulaBuilder, abstraction_state: AbstractionState) -> Self {
        Self {
            environment: Environment::new(),
            assumptions: OrdSet::new(),
            variable_selection: VariableSelection::All,
            variable_types: OrdMap::new(),
            abstraction_state,
            builder,
            overflow_detected: false,
            overapproximates_unsupported_feature: false,
        }
    }

    /// The initial state of an analysis run under `precision`
    pub fn initial(builder: FormulaBuilder, precision: &InvariantsPrecision) -> Self {
        let selection = if precision.interesting_variables.is_empty() {
            VariableSelection::All
        } else {
            VariableSelection::Specified(precision.interesting_variables.clone())
        };
        Self::new(builder, precision.abstraction_strategy.initial_state()).with_selection(selection)
    }

    /// Replaces the variable selection
    pub fn with_selection(mut self, selection: VariableSelection) -> Self {
        self.variable_selection = selection;
        self
    }

    /// Replaces the builder, keeping all knowledge. The new builder must
    /// fold under the same wraparound policy.
    pub fn with_builder(mut self, builder: FormulaBuilder) -> Self {
        debug_assert_eq!(self.builder.factory(), builder.factory());
        self.builder = builder;
        self
    }

    /// The builder this state folds formulas with
    pub fn builder(&self) -> &FormulaBuilder {
        &self.builder
    }

    /// The variable definitions
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The recorded assumptions
    pub fn assumptions(&self) -> impl Iterator<Item = &Arc<BooleanFormula>> {
        self.assumptions.iter()
    }

    /// The variable selection
    pub fn variable_selection(&self) -> &VariableSelection {
        &self.variable_selection
    }

    /// The abstraction bookkeeping
    pub fn abstraction_state(&self) -> &AbstractionState {
        &self.abstraction_state
    }

    /// Replaces the abstraction bookkeeping
    pub fn with_abstraction_state(mut self, abstraction_state: AbstractionState) -> Self {
        self.abstraction_state = abstraction_state;
        self
    }

    /// The declared type of `location`, if known
    pub fn variable_type(&self, location: &MemoryLocation) -> Option<TypeInfo> {
        self.variable_types.get(location).copied()
    }

    /// Records the declared type of `location`
    pub fn with_type(&self, location: MemoryLocation, type_info: TypeInfo) -> Self {
        Self {
            variable_types: self.variable_types.update(location, type_info),
            ..self.clone()
        }
    }

    /// Whether an overflow was observed on the way to this state
    pub fn overflow_detected(&self) -> bool {
        self.overflow_detected
    }

    /// Marks the state as reached through an overflowing operation. The
    /// flag is sticky.
    pub fn with_overflow_detected(&self, detected: bool) -> Self {
        Self {
            overflow_detected: self.overflow_detected || detected,
            ..self.clone()
        }
    }

    /// Whether a construct the analysis cannot track forced an
    /// over-approximation on the way to this state
    pub fn overapproximates_unsupported_feature(&self) -> bool {
        self.overapproximates_unsupported_feature
    }

    /// Marks the state as over-approximating an untracked construct. The
    /// flag is sticky.
    pub fn with_unsupported_feature(&self, detected: bool) -> Self {
        Self {
            overapproximates_unsupported_feature: self.overapproximates_unsupported_feature
                || detected,
            ..self.clone()
        }
    }

    /// Binds `location` to `formula`.
    ///
    /// Occurrences of the target inside the assigned formula, inside other
    /// definitions and inside recorded assumptions refer to the value
    /// before the assignment, so they are replaced by the target's previous
    /// definition first. Formulas growing past the precision's depth bound
    /// are collapsed to the value set they evaluate to. Writes to locations
    /// the analysis cannot track, such as array elements or pointer
    /// targets, forget the location instead and mark the state. Re-binding
    /// a variable to its current definition returns the state unchanged.
    pub fn assign(
        &self,
        location: MemoryLocation,
        formula: Arc<NumeralFormula>,
        precision: &InvariantsPrecision,
    ) -> InvariantsState {
        if location.is_unsupported_form() {
            return self.clear(&location).with_unsupported_feature(true);
        }
        let type_info = formula.type_info();
        let declared = self.variable_types.get(&location).copied().unwrap_or(type_info);
        let old_value = self.environment.resolve(&location, declared, &self.builder);
        let new_formula = NumeralFormula::replace(&formula, &location, &old_value);
        let selection = match self.variable_selection.accept_assignment(
            &location,
            &new_formula,
            precision.interesting_variable_limit,
        ) {
            Some(selection) => selection,
            None => return self.clear(&location),
        };
        let new_formula = if new_formula.depth() > precision.maximum_formula_depth {
            let value = evaluate(&new_formula, &self.environment, self.builder.factory());
            self.builder.constant(type_info, value)
        } else {
            new_formula
        };
        if self.environment.get(&location) == Some(&new_formula) {
            return self.clone();
        }
        let (environment, assumptions) = self.substitute_references(&location, &old_value);
        let environment = environment.define(location.clone(), new_formula, &self.builder);
        InvariantsState {
            environment,
            assumptions,
            variable_selection: selection,
            variable_types: self.variable_types.update(location, declared),
            abstraction_state: self.abstraction_state.clone(),
            builder: self.builder.clone(),
            overflow_detected: self.overflow_detected,
            overapproximates_unsupported_feature: self.overapproximates_unsupported_feature,
        }
    }

    /// Refines the state under `formula`.
    ///
    /// Returns `None` when the assumption contradicts the state, `Some`
    /// with the state unchanged when the assumption holds trivially or
    /// concerns untracked variables only.
    pub fn assume(
        &self,
        formula: &Arc<BooleanFormula>,
        precision: &InvariantsPrecision,
    ) -> Option<InvariantsState> {
        let folded = partial_evaluate_boolean(formula, &self.environment, &self.builder);
        match folded.as_ref() {
            BooleanFormula::Constant(true) => return Some(self.clone()),
            BooleanFormula::Constant(false) => return None,
            _ => {}
        }
        let selection = match self
            .variable_selection
            .accept_assumption(&folded, precision.interesting_variable_limit)
        {
            Some(selection) => selection,
            None => return Some(self.clone()),
        };
        let environment = push_assumption(&self.environment, &self.builder, &folded, true)?;
        let mut assumptions = self.assumptions.clone();
        for conjunct in BooleanFormula::split_conjunctions(&folded) {
            assumptions.insert(conjunct);
        }
        Some(InvariantsState {
            environment,
            assumptions,
            variable_selection: selection,
            variable_types: self.variable_types.clone(),
            abstraction_state: self.abstraction_state.clone(),
            builder: self.builder.clone(),
            overflow_detected: self.overflow_detected,
            overapproximates_unsupported_feature: self.overapproximates_unsupported_feature,
        })
    }

    /// Forgets everything about `location`.
    ///
    /// References to it in other definitions and in assumptions are
    /// replaced by its previous definition, so their meaning survives the
    /// binding's removal.
    pub fn clear(&self, location: &MemoryLocation) -> InvariantsState {
        let replacement = match self.environment.get(location) {
            Some(bound) => Some(Arc::clone(bound)),
            None => self
                .variable_types
                .get(location)
                .map(|type_info| self.builder.constant(*type_info, type_info.all_possible_values())),
        };
        let (environment, assumptions) = match &replacement {
            Some(replacement) => self.substitute_references(location, replacement),
            None => self.forget_references(location),
        };
        InvariantsState {
            environment: environment.remove(location),
            assumptions,
            variable_selection: self.variable_selection.clone(),
            variable_types: self.variable_types.without(location),
            abstraction_state: self.abstraction_state.clone(),
            builder: self.builder.clone(),
            overflow_detected: self.overflow_detected,
            overapproximates_unsupported_feature: self.overapproximates_unsupported_feature,
        }
    }

    /// Forgets everything about the locations matching `predicate`
    pub fn clear_all(&self, mut predicate: impl FnMut(&MemoryLocation) -> bool) -> InvariantsState {
        let mut affected = BTreeSet::new();
        for location in self.environment.locations() {
            if predicate(location) {
                affected.insert(location.clone());
            }
        }
        for location in self.variable_types.keys() {
            if predicate(location) {
                affected.insert(location.clone());
            }
        }
        for (_, bound) in self.environment.iter() {
            for variable in bound.variables() {
                if predicate(&variable) {
                    affected.insert(variable);
                }
            }
        }
        for assumption in &self.assumptions {
            for variable in assumption.variables() {
                if predicate(&variable) {
                    affected.insert(variable);
                }
            }
        }
        affected
            .into_iter()
            .fold(self.clone(), |state, location| state.clear(&location))
    }

    /// The least state covering both operands.
    ///
    /// A variable stays bound when it is bound on both sides; differing
    /// definitions collapse to the union of their values, each side
    /// evaluated in its own environment. An assumption survives when the
    /// other side guarantees it too. When one operand already covers the
    /// other, the covering operand is returned as-is.
    pub fn join(&self, other: &InvariantsState, _precision: &InvariantsPrecision) -> InvariantsState {
        if other.is_less_or_equal(self) {
            return self.clone();
        }
        if self.is_less_or_equal(other) {
            return other.clone();
        }
        let factory = self.builder.factory();
        let mut environment = Environment::new();
        for (location, f1) in self.environment.iter() {
            let f2 = match other.environment.get(location) {
                Some(f2) => f2,
                None => continue,
            };
            let joined = if f1 == f2 {
                Arc::clone(f1)
            } else {
                // a union formula would re-read both definitions under the
                // joined bindings, which is wrong for non-monotone nodes
                // like exclusions; union the per-side values instead
                let manager = factory.create_manager(f1.type_info());
                let value = manager.union(
                    &evaluate(f1, &self.environment, factory),
                    &evaluate(f2, &other.environment, factory),
                );
                self.builder.constant(f1.type_info(), value)
            };
            environment = environment.define(location.clone(), joined, &self.builder);
        }
        let mut assumptions = OrdSet::new();
        for assumption in &self.assumptions {
            if other.definitely_implies(assumption) {
                assumptions.insert(Arc::clone(assumption));
            }
        }
        for assumption in &other.assumptions {
            if self.definitely_implies(assumption) {
                assumptions.insert(Arc::clone(assumption));
            }
        }
        InvariantsState {
            environment,
            assumptions,
            variable_selection: self.variable_selection.join(&other.variable_selection),
            variable_types: self.variable_types.clone().union(other.variable_types.clone()),
            abstraction_state: self.abstraction_state.join(&other.abstraction_state),
            builder: self.builder.clone(),
            overflow_detected: self.overflow_detected || other.overflow_detected,
            overapproximates_unsupported_feature: self.overapproximates_unsupported_feature
                || other.overapproximates_unsupported_feature,
        }
    }

    /// Widens this state against its predecessor on the same location.
    ///
    /// Bounds of widening targets that moved since `previous` are dropped
    /// to the end of the variable's type range; stable targets keep the
    /// value they had in `previous` so the iteration settles. Assumptions about
    /// widened variables are discarded, then every widening hint the
    /// pre-widening state can prove is assumed again, which is where upper
    /// bounds lost to widening are recovered from.
    pub fn widen(&self, previous: &InvariantsState, precision: &InvariantsPrecision) -> InvariantsState {
        let targets = self.abstraction_state.determine_widening_targets();
        let factory = self.builder.factory();
        let mut environment = self.environment.clone();
        let mut unstable: Vec<(MemoryLocation, TypeInfo, CompoundInterval)> = Vec::new();
        for (location, formula) in self.environment.iter() {
            if !targets.contains(location) {
                continue;
            }
            // deep formulas are evaluated coarsely so the widened value
            // chain stays short
            let current = if formula.depth() > precision.maximum_formula_depth {
                evaluate_abstractly(formula, &self.environment, factory)
            } else {
                evaluate(formula, &self.environment, factory)
            };
            let earlier = previous.evaluate_variable(location);
            if earlier.contains(&current) {
                // a non-constant previous formula would be re-read under
                // the current bindings and could mean something else; carry
                // over the previous value instead
                if let Some(previous_formula) = previous.environment.get(location) {
                    let kept = match previous_formula.as_ref() {
                        NumeralFormula::Constant { .. } => Arc::clone(previous_formula),
                        _ => self.builder.constant(formula.type_info(), earlier),
                    };
                    environment = environment.define(location.clone(), kept, &self.builder);
                }
                continue;
            }
            let type_info = formula.type_info();
            let moved_down = match (current.lower_bound(), earlier.lower_bound()) {
                (Some(now), Some(before)) => now < before,
                (None, Some(_)) => true,
                _ => false,
            };
            let moved_up = match (current.upper_bound(), earlier.upper_bound()) {
                (Some(now), Some(before)) => now > before,
                (None, Some(_)) => true,
                _ => false,
            };
            let mut value = current.union_with(&earlier);
            if moved_down {
                value = value.extend_to_neg_infinity();
            }
            if moved_up {
                value = value.extend_to_pos_infinity();
            }
            let value = value.intersect_with(&type_info.all_possible_values());
            log::debug!("widening {location}: {earlier} and {current} to {value}");
            environment = environment.define(
                location.clone(),
                self.builder.constant(type_info, value),
                &self.builder,
            );
            unstable.push((location.clone(), type_info, current));
        }
        let assumptions: OrdSet<Arc<BooleanFormula>> = self
            .assumptions
            .iter()
            .filter(|assumption| {
                !unstable
                    .iter()
                    .any(|(location, _, _)| assumption.mentions(location))
            })
            .cloned()
            .collect();
        let mut result = InvariantsState {
            environment,
            assumptions,
            variable_selection: self.variable_selection.join(&previous.variable_selection),
            variable_types: self.variable_types.clone().union(previous.variable_types.clone()),
            abstraction_state: self.abstraction_state.join(&previous.abstraction_state),
            builder: self.builder.clone(),
            overflow_detected: self.overflow_detected || previous.overflow_detected,
            overapproximates_unsupported_feature: self.overapproximates_unsupported_feature
                || previous.overapproximates_unsupported_feature,
        };
        for hint in self.abstraction_state.widening_hints() {
            let concerned = unstable
                .iter()
                .any(|(location, _, _)| hint.mentions(location));
            if concerned && self.definitely_implies(&hint) {
                if let Some(refined) = result.assume(&hint, precision) {
                    result = refined;
                }
            }
        }
        if precision.use_mod2_template {
            for (location, type_info, current) in &unstable {
                let manager = factory.create_manager(*type_info);
                let two = CompoundInterval::singleton(2);
                let parity = manager.modulo(current, &two);
                let earlier_parity = manager.modulo(&previous.evaluate_variable(location), &two);
                if parity.is_singleton() && parity == earlier_parity {
                    let variable = self.builder.variable(*type_info, location.clone());
                    let remainder = self
                        .builder
                        .modulo(&variable, &self.builder.singleton(*type_info, 2));
                    let claim = self
                        .builder
                        .equal(&remainder, &self.builder.constant(*type_info, parity));
                    if let Some(refined) = result.assume(&claim, precision) {
                        result = refined;
                    }
                }
            }
        }
        result
    }

    /// Whether `other` covers this state
    pub fn is_less_or_equal(&self, other: &InvariantsState) -> bool {
        if !self.abstraction_state.is_less_or_equal(&other.abstraction_state) {
            return false;
        }
        if self.overflow_detected && !other.overflow_detected {
            return false;
        }
        if self.overapproximates_unsupported_feature && !other.overapproximates_unsupported_feature
        {
            return false;
        }
        for assumption in &other.assumptions {
            if !self.definitely_implies(assumption) {
                return false;
            }
        }
        for (location, formula) in other.environment.iter() {
            if self.environment.get(location) == Some(formula) {
                continue;
            }
            let variable = self.builder.variable(formula.type_info(), location.clone());
            let claim = self.builder.equal(&variable, formula);
            if !self.definitely_implies(&claim) {
                return false;
            }
        }
        true
    }

    /// Whether the state guarantees `formula`
    pub fn definitely_implies(&self, formula: &Arc<BooleanFormula>) -> bool {
        BooleanFormula::split_conjunctions(formula)
            .iter()
            .all(|conjunct| self.implies_conjunct(conjunct))
    }

    /// The set of values `location` may hold in this state
    pub fn evaluate_variable(&self, location: &MemoryLocation) -> CompoundInterval {
        match self.environment.get(location) {
            Some(formula) => evaluate(formula, &self.environment, self.builder.factory()),
            None => match self.variable_types.get(location) {
                Some(type_info) => type_info.all_possible_values(),
                None => CompoundInterval::top(),
            },
        }
    }

    /// The state's knowledge as a list of boolean facts
    pub fn environment_as_formulas(&self) -> Vec<Arc<BooleanFormula>> {
        let mut formulas = Vec::new();
        for (location, formula) in self.environment.iter() {
            let variable = self.builder.variable(formula.type_info(), location.clone());
            formulas.push(self.builder.equal(&variable, formula));
        }
        formulas.extend(self.assumptions.iter().cloned());
        formulas
    }

    /// Renders the value set of every known variable
    pub fn invariant_summary(&self) -> BTreeMap<String, String> {
        let mut summary = BTreeMap::new();
        for location in self.known_locations() {
            summary.insert(
                location.as_str().to_string(),
                self.evaluate_variable(&location).to_string(),
            );
        }
        summary
    }

    /// The state as a JSON document, one entry per known variable plus the
    /// recorded assumptions
    pub fn invariant_summary_json(&self) -> serde_json::Value {
        let mut variables = serde_json::Map::new();
        for location in self.known_locations() {
            let value = self.evaluate_variable(&location);
            let intervals: Vec<serde_json::Value> = value
                .intervals()
                .iter()
                .map(|interval| {
                    json!({
                        "lower": interval.lower_bound().map(|bound| bound.to_string()),
                        "upper": interval.upper_bound().map(|bound| bound.to_string()),
                    })
                })
                .collect();
            let mut entry = serde_json::Map::new();
            entry.insert("values".into(), json!(value.to_string()));
            entry.insert("intervals".into(), json!(intervals));
            if let Some(formula) = self.environment.get(&location) {
                entry.insert("formula".into(), json!(formula.to_string()));
            }
            variables.insert(location.as_str().to_string(), serde_json::Value::Object(entry));
        }
        json!({
            "variables": variables,
            "assumptions": self
                .assumptions
                .iter()
                .map(|assumption| assumption.to_string())
                .collect::<Vec<_>>(),
        })
    }

    fn implies_conjunct(&self, formula: &Arc<BooleanFormula>) -> bool {
        if let BooleanFormula::Constant(value) = formula.as_ref() {
            return *value;
        }
        if self.assumptions.contains(formula) {
            return true;
        }
        // an equality against a constant set is a containment claim
        if let BooleanFormula::Equal { op1, op2 } = formula.as_ref() {
            let containment = |variable: &NumeralFormula, constant: &NumeralFormula| match (
                variable, constant,
            ) {
                (
                    NumeralFormula::Variable { location, .. },
                    NumeralFormula::Constant { value, .. },
                ) => Some(value.contains(&self.evaluate_variable(location))),
                _ => None,
            };
            if let Some(contained) =
                containment(op1.as_ref(), op2.as_ref()).or_else(|| containment(op2.as_ref(), op1.as_ref()))
            {
                if contained {
                    return true;
                }
            }
        }
        evaluate_boolean(formula, &self.environment, self.builder.factory()).is_definitely_true()
    }

    fn known_locations(&self) -> BTreeSet<MemoryLocation> {
        let mut locations: BTreeSet<MemoryLocation> =
            self.environment.locations().cloned().collect();
        locations.extend(self.variable_types.keys().cloned());
        locations
    }

    /// Replaces references to `location` in definitions and assumptions by
    /// `replacement`, folding what the substitution closed
    fn substitute_references(
        &self,
        location: &MemoryLocation,
        replacement: &Arc<NumeralFormula>,
    ) -> (Environment, OrdSet<Arc<BooleanFormula>>) {
        let mut environment = self.environment.clone();
        for (bound_location, bound) in self.environment.iter() {
            if bound_location != location && bound.mentions(location) {
                let replaced = NumeralFormula::replace(bound, location, replacement);
                let folded = partial_evaluate(&replaced, &self.environment, &self.builder);
                environment = environment.define(bound_location.clone(), folded, &self.builder);
            }
        }
        let mut assumptions = OrdSet::new();
        for assumption in &self.assumptions {
            if assumption.mentions(location) {
                let replaced = BooleanFormula::replace(assumption, location, replacement);
                let folded = partial_evaluate_boolean(&replaced, &self.environment, &self.builder);
                if !matches!(folded.as_ref(), BooleanFormula::Constant(true)) {
                    assumptions.insert(folded);
                }
            } else {
                assumptions.insert(Arc::clone(assumption));
            }
        }
        (environment, assumptions)
    }

    /// Drops definitions and assumptions referencing `location` when no
    /// replacement formula can be built for it
    fn forget_references(&self, location: &MemoryLocation) -> (Environment, OrdSet<Arc<BooleanFormula>>) {
        let mut environment = self.environment.clone();
        for (bound_location, bound) in self.environment.iter() {
            if bound.mentions(location) {
                environment = environment.remove(bound_location);
            }
        }
        let assumptions = self
            .assumptions
            .iter()
            .filter(|assumption| !assumption.mentions(location))
            .cloned()
            .collect();
        (environment, assumptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstraction::AbstractionStrategy;
    use crate::interval::SimpleInterval;
    use crate::manager::CompoundIntervalManagerFactory;

    fn builder() -> FormulaBuilder {
        FormulaBuilder::new(CompoundIntervalManagerFactory::default())
    }

    fn fresh() -> InvariantsState {
        InvariantsState::new(builder(), AbstractionStrategy::EnteringEdges.initial_state())
    }

    fn x() -> MemoryLocation {
        MemoryLocation::new("x")
    }

    fn y() -> MemoryLocation {
        MemoryLocation::new("y")
    }

    fn i32_type() -> TypeInfo {
        TypeInfo::signed(32)
    }

    #[test]
    fn join_of_branches_unions_values() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let zero = state.assign(x(), b.singleton(i32_type(), 0), &precision);
        let one = state.assign(x(), b.singleton(i32_type(), 1), &precision);
        let joined = zero.join(&one, &precision);
        assert_eq!(
            joined.evaluate_variable(&x()),
            CompoundInterval::of(SimpleInterval::of(0, 1))
        );
    }

    #[test]
    fn join_keeps_values_admitted_by_either_branch() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let nonzero = state
            .assign(x(), b.singleton(i32_type(), 0), &precision)
            .assign(y(), b.exclusion(&b.variable(i32_type(), x())), &precision);
        let five = state
            .assign(x(), b.singleton(i32_type(), 1), &precision)
            .assign(y(), b.singleton(i32_type(), 5), &precision);
        let joined = nonzero.join(&five, &precision);
        let values = joined.evaluate_variable(&y());
        // the first branch admits any nonzero y, including 1
        assert!(values.contains(&CompoundInterval::singleton(1)));
        assert!(!values.contains(&CompoundInterval::singleton(0)));
    }

    #[test]
    fn assignment_keeps_the_meaning_of_dependents() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let state = state.assign(x(), b.singleton(i32_type(), 5), &precision);
        let sum = b.add(&b.variable(i32_type(), x()), &b.singleton(i32_type(), 1));
        let state = state.assign(y(), sum, &precision);
        assert_eq!(state.evaluate_variable(&y()), CompoundInterval::singleton(6));
        let state = state.assign(x(), b.singleton(i32_type(), 7), &precision);
        assert_eq!(state.evaluate_variable(&x()), CompoundInterval::singleton(7));
        assert_eq!(state.evaluate_variable(&y()), CompoundInterval::singleton(6));
    }

    #[test]
    fn self_reference_reads_the_old_value() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let state = state.assign(x(), b.singleton(i32_type(), 5), &precision);
        let increment = b.add(&b.variable(i32_type(), x()), &b.singleton(i32_type(), 1));
        let state = state.assign(x(), increment, &precision);
        assert_eq!(state.evaluate_variable(&x()), CompoundInterval::singleton(6));
    }

    #[test]
    fn assumptions_refine_and_contradict() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let hundred = b.constant(i32_type(), CompoundInterval::of(SimpleInterval::of(0, 100)));
        let state = state.assign(x(), hundred, &precision);
        let below = b.less_than(&b.variable(i32_type(), x()), &b.singleton(i32_type(), 50));
        let refined = state.assume(&below, &precision).unwrap();
        assert_eq!(
            refined.evaluate_variable(&x()),
            CompoundInterval::of(SimpleInterval::of(0, 49))
        );
        let impossible = b.equal(&b.variable(i32_type(), x()), &b.singleton(i32_type(), 200));
        assert_eq!(state.assume(&impossible, &precision), None);
    }

    #[test]
    fn untracked_assignments_are_forgotten() {
        let precision = InvariantsPrecision::default();
        let state = fresh().with_selection(VariableSelection::Specified(OrdSet::from(vec![x()])));
        let b = state.builder().clone();
        let state = state.assign(y(), b.singleton(i32_type(), 3), &precision);
        assert!(state.evaluate_variable(&y()).is_top());
        let state = state.assign(x(), b.singleton(i32_type(), 3), &precision);
        assert_eq!(state.evaluate_variable(&x()), CompoundInterval::singleton(3));
    }

    #[test]
    fn assumptions_grow_the_selection() {
        let precision = InvariantsPrecision::default();
        let state = fresh().with_selection(VariableSelection::Specified(OrdSet::from(vec![x()])));
        let b = state.builder().clone();
        let tie = b.equal(
            &b.variable(i32_type(), x()),
            &b.variable(i32_type(), y()),
        );
        let state = state.assume(&tie, &precision).unwrap();
        assert!(state.variable_selection().contains(&y()));
    }

    #[test]
    fn clearing_severs_dependencies() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let state = state.assign(x(), b.singleton(i32_type(), 5), &precision);
        let sum = b.add(&b.variable(i32_type(), x()), &b.singleton(i32_type(), 1));
        let state = state.assign(y(), sum, &precision);
        let state = state.clear(&x());
        assert!(state.evaluate_variable(&x()).is_top());
        assert_eq!(state.evaluate_variable(&y()), CompoundInterval::singleton(6));
    }

    #[test]
    fn scope_exit_clears_function_locals() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let local = MemoryLocation::scoped("callee", "tmp");
        let state = state.assign(local.clone(), b.singleton(i32_type(), 1), &precision);
        let state = state.assign(x(), b.singleton(i32_type(), 2), &precision);
        let state = state.clear_all(|location| location.is_scoped_in("callee"));
        assert!(state.evaluate_variable(&local).is_top());
        assert_eq!(state.evaluate_variable(&x()), CompoundInterval::singleton(2));
    }

    #[test]
    fn covering_follows_value_containment() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let narrow = state.assign(
            x(),
            b.constant(i32_type(), CompoundInterval::of(SimpleInterval::of(0, 5))),
            &precision,
        );
        let wide = state.assign(
            x(),
            b.constant(i32_type(), CompoundInterval::of(SimpleInterval::of(0, 10))),
            &precision,
        );
        assert!(narrow.is_less_or_equal(&wide));
        assert!(!wide.is_less_or_equal(&narrow));
        assert!(narrow.is_less_or_equal(&narrow));
    }

    #[test]
    fn widening_drops_moving_bounds_and_hints_recover_them() {
        let precision = InvariantsPrecision::default();
        let b = builder();
        let hint = b.less_than(&b.variable(i32_type(), x()), &b.singleton(i32_type(), 10));
        let abstraction = AbstractionState::VisitedEdges {
            edges: OrdSet::new(),
            widening_targets: OrdSet::from(vec![x()]),
            widening_hints: OrdSet::from(vec![hint]),
        };
        let state = InvariantsState::new(b.clone(), abstraction);
        let previous = state.assign(
            x(),
            b.constant(i32_type(), CompoundInterval::singleton(0)),
            &precision,
        );
        let current = previous.assign(
            x(),
            b.constant(i32_type(), CompoundInterval::of(SimpleInterval::of(0, 1))),
            &precision,
        );
        let widened = current.widen(&previous, &precision);
        assert_eq!(
            widened.evaluate_variable(&x()),
            CompoundInterval::of(SimpleInterval::of(0, 9))
        );
    }

    #[test]
    fn widening_keeps_stable_definitions() {
        let precision = InvariantsPrecision::default();
        let b = builder();
        let abstraction = AbstractionState::VisitedEdges {
            edges: OrdSet::new(),
            widening_targets: OrdSet::from(vec![x()]),
            widening_hints: OrdSet::new(),
        };
        let state = InvariantsState::new(b.clone(), abstraction);
        let bound = b.constant(i32_type(), CompoundInterval::of(SimpleInterval::of(0, 10)));
        let previous = state.assign(x(), bound, &precision);
        let current = previous.assign(
            x(),
            b.constant(i32_type(), CompoundInterval::of(SimpleInterval::of(3, 7))),
            &precision,
        );
        let widened = current.widen(&previous, &precision);
        assert_eq!(
            widened.evaluate_variable(&x()),
            CompoundInterval::of(SimpleInterval::of(0, 10))
        );
        assert!(widened.is_less_or_equal(&previous));
    }

    #[test]
    fn widening_keeps_stable_values_not_stale_formulas() {
        let precision = InvariantsPrecision::default();
        let b = builder();
        let abstraction = AbstractionState::VisitedEdges {
            edges: OrdSet::new(),
            widening_targets: OrdSet::from(vec![x(), y()]),
            widening_hints: OrdSet::new(),
        };
        let state = InvariantsState::new(b.clone(), abstraction);
        // y is defined through x while x is still unknown
        let previous = state.assign(y(), b.variable(i32_type(), x()), &precision);
        let current = previous
            .assign(x(), b.singleton(i32_type(), 9), &precision)
            .assign(y(), b.singleton(i32_type(), 3), &precision);
        let widened = current.widen(&previous, &precision);
        // only the value of the previous definition survives, not the
        // formula, which would now read x = 9
        let values = widened.evaluate_variable(&y());
        assert!(values.contains(&CompoundInterval::singleton(3)));
        assert_eq!(values, i32_type().all_possible_values());
    }

    #[test]
    fn parity_template_survives_widening() {
        let precision = InvariantsPrecision {
            use_mod2_template: true,
            ..Default::default()
        };
        let b = builder();
        let abstraction = AbstractionState::VisitedEdges {
            edges: OrdSet::new(),
            widening_targets: OrdSet::from(vec![x()]),
            widening_hints: OrdSet::new(),
        };
        let state = InvariantsState::new(b.clone(), abstraction);
        let previous = state.assign(
            x(),
            b.constant(i32_type(), CompoundInterval::singleton(0)),
            &precision,
        );
        let current = previous.assign(
            x(),
            b.constant(
                i32_type(),
                CompoundInterval::from_intervals(vec![
                    SimpleInterval::singleton(0),
                    SimpleInterval::singleton(2),
                ]),
            ),
            &precision,
        );
        let widened = current.widen(&previous, &precision);
        let claim = b.equal(
            &b.modulo(&b.variable(i32_type(), x()), &b.singleton(i32_type(), 2)),
            &b.constant(i32_type(), CompoundInterval::singleton(0)),
        );
        assert!(widened.definitely_implies(&claim));
    }

    #[test]
    fn overflow_flag_is_sticky_across_joins() {
        let precision = InvariantsPrecision::default();
        let clean = fresh();
        let tainted = clean.with_overflow_detected(true);
        assert!(tainted.with_overflow_detected(false).overflow_detected());
        assert!(clean.join(&tainted, &precision).overflow_detected());
        assert!(!tainted.is_less_or_equal(&clean));
        assert!(clean.is_less_or_equal(&tainted));
    }

    #[test]
    fn unsupported_targets_are_cleared_and_marked() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let element = MemoryLocation::new("a[i]");
        let state = state.assign(element.clone(), b.singleton(i32_type(), 3), &precision);
        assert!(state.evaluate_variable(&element).is_top());
        assert!(state.overapproximates_unsupported_feature());
        assert!(!state.is_less_or_equal(&fresh()));
        assert!(fresh().is_less_or_equal(&state));
    }

    #[test]
    fn summaries_render_every_known_variable() {
        let precision = InvariantsPrecision::default();
        let state = fresh();
        let b = state.builder().clone();
        let state = state
            .assign(x(), b.singleton(i32_type(), 4), &precision)
            .with_type(y(), TypeInfo::unsigned(8));
        let summary = state.invariant_summary();
        assert_eq!(summary.get("x"), Some(&"{[4, 4]}".to_string()));
        assert_eq!(summary.get("y"), Some(&"{[0, 255]}".to_string()));
    }
}
