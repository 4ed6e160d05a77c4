//! Strategies deciding when to widen and which variables to widen.

use crate::analyzer::EdgeAnalyzer;
use crate::cfg::{Cfa, EdgeId, EdgeKind, LocationId};
use crate::expr::Expression;
use crate::formula::{BooleanFormula, MemoryLocation};
use im::OrdSet;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// How abstraction points are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractionStrategy {
    /// Widen every variable at every join
    Always,
    /// Never widen; termination is not guaranteed on programs with loops
    Never,
    /// Widen only variables that are reassigned on the edges a location was
    /// reached over, and remember branch conditions seen on the way as
    /// widening hints
    EnteringEdges,
}

impl AbstractionStrategy {
    /// The tracking state an analysis under this strategy starts from
    pub fn initial_state(&self) -> AbstractionState {
        match self {
            AbstractionStrategy::Always => AbstractionState::Always,
            AbstractionStrategy::Never => AbstractionState::Never,
            AbstractionStrategy::EnteringEdges => AbstractionState::VisitedEdges {
                edges: OrdSet::new(),
                widening_targets: OrdSet::new(),
                widening_hints: OrdSet::new(),
            },
        }
    }
}

/// The set of variables widening may touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WideningTargets {
    /// Every variable
    All,
    /// Exactly these variables
    These(OrdSet<MemoryLocation>),
}

impl WideningTargets {
    /// Whether `location` may be widened
    pub fn contains(&self, location: &MemoryLocation) -> bool {
        match self {
            WideningTargets::All => true,
            WideningTargets::These(targets) => targets.contains(location),
        }
    }
}

/// Per-state bookkeeping of an abstraction strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbstractionState {
    /// Everything is widened, no bookkeeping needed
    Always,
    /// Nothing is widened, no bookkeeping needed
    Never,
    /// The edges this state was reached over, with the widening targets and
    /// hints derived from them
    VisitedEdges {
        /// Entering edges seen so far
        edges: OrdSet<EdgeId>,
        /// Variables reassigned non-trivially on those edges
        widening_targets: OrdSet<MemoryLocation>,
        /// Branch conditions seen on those edges
        widening_hints: OrdSet<Arc<BooleanFormula>>,
    },
}

impl AbstractionState {
    /// Whether widening should run at all
    pub fn perform_abstraction(&self) -> bool {
        !matches!(self, AbstractionState::Never)
    }

    /// Records that the state is propagated over `edge`.
    ///
    /// Uninformative edges are traversed backwards until the assignments
    /// responsible for the incoming values are found; those assignments'
    /// targets become widening targets. Conditions passed on the way are
    /// kept as widening hints. Recording the same edge twice is a no-op.
    pub fn add_entering_edge(
        &self,
        cfa: &Cfa,
        analyzer: &EdgeAnalyzer,
        edge: EdgeId,
    ) -> AbstractionState {
        let (edges, widening_targets, widening_hints) = match self {
            AbstractionState::Always | AbstractionState::Never => return self.clone(),
            AbstractionState::VisitedEdges {
                edges,
                widening_targets,
                widening_hints,
            } => (edges, widening_targets, widening_hints),
        };
        if edges.contains(&edge) {
            return self.clone();
        }
        let mut targets = widening_targets.clone();
        let mut hints = widening_hints.clone();
        let mut queue = VecDeque::new();
        queue.push_back(edge);
        let mut visited = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let walked = cfa.edge(current);
            match &walked.kind {
                EdgeKind::Blank => expand_into(cfa, walked.predecessor, &mut queue),
                EdgeKind::Assume { condition, assumed } => {
                    let formula = analyzer.boolean_formula_of(condition);
                    let formula = if *assumed {
                        formula
                    } else {
                        analyzer.builder().logical_not(&formula)
                    };
                    if !matches!(formula.as_ref(), BooleanFormula::Constant(_)) {
                        hints.insert(formula);
                    }
                    expand_into(cfa, walked.predecessor, &mut queue);
                }
                EdgeKind::Declaration {
                    variable,
                    initializer,
                    ..
                } => match initializer {
                    Some(initializer) if !is_trivial(initializer) => {
                        targets.insert(variable.clone());
                    }
                    _ => expand_into(cfa, walked.predecessor, &mut queue),
                },
                EdgeKind::Statement { lhs, rhs } => match lhs.memory_location() {
                    Some(target) if !is_trivial(rhs) => {
                        targets.insert(target);
                    }
                    _ => expand_into(cfa, walked.predecessor, &mut queue),
                },
                EdgeKind::FunctionCall { parameters, .. } => {
                    let mut informative = false;
                    for (parameter, argument) in parameters {
                        if !is_trivial(argument) {
                            targets.insert(parameter.clone());
                            informative = true;
                        }
                    }
                    if !informative {
                        expand_into(cfa, walked.predecessor, &mut queue);
                    }
                }
                EdgeKind::FunctionReturn {
                    assignment,
                    call_location,
                    ..
                } => {
                    if let Some((target, value)) = assignment {
                        if !is_trivial(value) {
                            targets.insert(target.clone());
                        }
                    }
                    // values may also stem from before the call
                    expand_into(cfa, *call_location, &mut queue);
                }
            }
        }
        AbstractionState::VisitedEdges {
            edges: edges.update(edge),
            widening_targets: targets,
            widening_hints: hints,
        }
    }

    /// The variables the next widening is allowed to touch
    pub fn determine_widening_targets(&self) -> WideningTargets {
        match self {
            AbstractionState::Always => WideningTargets::All,
            AbstractionState::Never => WideningTargets::These(OrdSet::new()),
            AbstractionState::VisitedEdges {
                widening_targets, ..
            } => WideningTargets::These(widening_targets.clone()),
        }
    }

    /// Conditions worth re-checking after widening
    pub fn widening_hints(&self) -> Vec<Arc<BooleanFormula>> {
        match self {
            AbstractionState::Always | AbstractionState::Never => Vec::new(),
            AbstractionState::VisitedEdges { widening_hints, .. } => {
                widening_hints.iter().cloned().collect()
            }
        }
    }

    /// The least state covering both operands
    pub fn join(&self, other: &AbstractionState) -> AbstractionState {
        match (self, other) {
            (AbstractionState::Always, AbstractionState::Always) => AbstractionState::Always,
            (AbstractionState::Never, AbstractionState::Never) => AbstractionState::Never,
            (
                AbstractionState::VisitedEdges {
                    edges: a,
                    widening_targets: at,
                    widening_hints: ah,
                },
                AbstractionState::VisitedEdges {
                    edges: b,
                    widening_targets: bt,
                    widening_hints: bh,
                },
            ) => {
                if is_subset(b, a) {
                    self.clone()
                } else if is_subset(a, b) {
                    other.clone()
                } else {
                    AbstractionState::VisitedEdges {
                        edges: a.clone().union(b.clone()),
                        widening_targets: at.clone().union(bt.clone()),
                        widening_hints: ah.clone().union(bh.clone()),
                    }
                }
            }
            _ => {
                debug_assert!(false, "abstraction states of different strategies");
                AbstractionState::Always
            }
        }
    }

    /// Whether `other` covers this state
    pub fn is_less_or_equal(&self, other: &AbstractionState) -> bool {
        match (self, other) {
            (AbstractionState::Always, AbstractionState::Always)
            | (AbstractionState::Never, AbstractionState::Never) => true,
            (
                AbstractionState::VisitedEdges { edges: a, .. },
                AbstractionState::VisitedEdges { edges: b, .. },
            ) => is_subset(a, b),
            _ => {
                debug_assert!(false, "abstraction states of different strategies");
                false
            }
        }
    }
}

fn expand_into(cfa: &Cfa, location: LocationId, queue: &mut VecDeque<EdgeId>) {
    for id in cfa.entering_edges(location) {
        queue.push_back(*id);
    }
}

fn is_trivial(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Literal { .. } | Expression::Variable { .. }
    )
}

fn is_subset<T: Ord + Clone>(smaller: &OrdSet<T>, larger: &OrdSet<T>) -> bool {
    smaller.iter().all(|element| larger.contains(element))
}
