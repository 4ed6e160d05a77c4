//! Precision settings steering the cost/precision trade-off of the analysis.

use crate::abstraction::AbstractionStrategy;
use crate::cfg::EdgeId;
use crate::formula::MemoryLocation;
use im::OrdSet;

/// Analysis precision settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantsPrecision {
    /// Edges whose effects are tracked precisely, or `None` for all of them
    pub relevant_edges: Option<OrdSet<EdgeId>>,
    /// Variables relations are tracked for even when they spread through
    /// otherwise uninteresting code
    pub interesting_variables: OrdSet<MemoryLocation>,
    /// Upper bound on how many variables a selection may grow to
    pub interesting_variable_limit: usize,
    /// Formulas deeper than this are collapsed to their current value
    pub maximum_formula_depth: usize,
    /// How widening points and targets are chosen
    pub abstraction_strategy: AbstractionStrategy,
    /// Whether widening guesses `x mod 2` invariants for widened variables
    pub use_mod2_template: bool,
}

impl InvariantsPrecision {
    /// Whether the effect of `edge` should be modelled precisely
    pub fn is_relevant(&self, edge: EdgeId) -> bool {
        match &self.relevant_edges {
            None => true,
            Some(edges) => edges.contains(&edge),
        }
    }

    /// A more precise version of this precision, doubling the depth and
    /// variable limits
    pub fn adjusted(&self) -> Self {
        Self {
            interesting_variable_limit: self.interesting_variable_limit.saturating_mul(2),
            maximum_formula_depth: self.maximum_formula_depth.saturating_mul(2),
            ..self.clone()
        }
    }
}

impl Default for InvariantsPrecision {
    fn default() -> Self {
        Self {
            relevant_edges: None,
            interesting_variables: OrdSet::new(),
            interesting_variable_limit: 2,
            maximum_formula_depth: 4,
            abstraction_strategy: AbstractionStrategy::EnteringEdges,
            use_mod2_template: false,
        }
    }
}
