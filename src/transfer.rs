//! Applies the effect of single control-flow edges to abstract states.

use crate::analyzer::EdgeAnalyzer;
use crate::cfg::{Cfa, EdgeId, EdgeKind};
use crate::formula::{FormulaBuilder, MemoryLocation};
use crate::manager::OverflowEventHandler;
use crate::precision::InvariantsPrecision;
use crate::state::InvariantsState;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error definitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// A statement edge assigns to an expression that is not an lvalue
    #[error("assignment target is not an lvalue")]
    AssignmentToRvalue,
}

/// Remembers whether an overflow happened while one successor was computed,
/// then forwards the notification to the analysis-wide sink
struct OverflowProbe {
    inner: Arc<dyn OverflowEventHandler>,
    hit: AtomicBool,
}

impl OverflowEventHandler for OverflowProbe {
    fn signed_overflow(&self) {
        self.hit.store(true, Ordering::Relaxed);
        self.inner.signed_overflow();
    }
}

/// Computes the abstract successor of a state over one edge
#[derive(Debug, Clone)]
pub struct EdgeTransfer {
    analyzer: EdgeAnalyzer,
}

impl EdgeTransfer {
    /// A transfer translating expressions through `analyzer`
    pub fn new(analyzer: EdgeAnalyzer) -> Self {
        Self { analyzer }
    }

    /// The expression translator in use
    pub fn analyzer(&self) -> &EdgeAnalyzer {
        &self.analyzer
    }

    /// The state after `edge`, or `None` when the edge is infeasible from
    /// `state`.
    ///
    /// Successors carry the overflow flag when the edge's arithmetic left
    /// its legal range, and their abstraction bookkeeping records the edge
    /// that produced them.
    pub fn successor(
        &self,
        state: &InvariantsState,
        cfa: &Cfa,
        edge: EdgeId,
        precision: &InvariantsPrecision,
    ) -> Result<Option<InvariantsState>, TransferError> {
        log::trace!("applying edge {edge:?}");
        let probe = Arc::new(OverflowProbe {
            inner: Arc::clone(state.builder().factory().overflow_event_handler()),
            hit: AtomicBool::new(false),
        });
        let probed = state
            .builder()
            .factory()
            .with_handler(Arc::clone(&probe) as Arc<dyn OverflowEventHandler>);
        let builder = FormulaBuilder::new(probed);
        let analyzer = EdgeAnalyzer::new(builder.clone());
        let current = state.clone().with_builder(builder.clone());
        let successor = match &cfa.edge(edge).kind {
            EdgeKind::Blank => Some(current),
            EdgeKind::Assume { condition, assumed } => {
                if precision.is_relevant(edge) {
                    let formula = analyzer.boolean_formula_of(condition);
                    let approximated = mentions_unsupported(formula.variables());
                    let formula = if *assumed {
                        formula
                    } else {
                        builder.logical_not(&formula)
                    };
                    current
                        .assume(&formula, precision)
                        .map(|refined| refined.with_unsupported_feature(approximated))
                } else {
                    Some(current)
                }
            }
            EdgeKind::Declaration {
                variable,
                type_info,
                initializer,
            } => Some(match initializer {
                Some(initializer) => {
                    let value = analyzer.numeral_formula_of(initializer);
                    let value = builder.cast(*type_info, &value);
                    let approximated = mentions_unsupported(value.variables());
                    current
                        .with_type(variable.clone(), *type_info)
                        .assign(variable.clone(), value, precision)
                        .with_unsupported_feature(approximated)
                }
                None => current
                    .clear(variable)
                    .with_type(variable.clone(), *type_info),
            }),
            EdgeKind::Statement { lhs, rhs } => {
                let target = lhs
                    .memory_location()
                    .ok_or(TransferError::AssignmentToRvalue)?;
                if target.is_unsupported_form() {
                    Some(clobbered(&current, &target))
                } else if precision.is_relevant(edge) {
                    let value = analyzer.numeral_formula_of(rhs);
                    let value = builder.cast(lhs.type_info(), &value);
                    let approximated = mentions_unsupported(value.variables());
                    Some(
                        current
                            .assign(target, value, precision)
                            .with_unsupported_feature(approximated),
                    )
                } else {
                    Some(current.clear(&target))
                }
            }
            EdgeKind::FunctionCall { parameters, .. } => {
                let mut passed = current;
                for (parameter, argument) in parameters {
                    let value = analyzer.numeral_formula_of(argument);
                    let approximated = mentions_unsupported(value.variables());
                    passed = passed
                        .assign(parameter.clone(), value, precision)
                        .with_unsupported_feature(approximated);
                }
                Some(passed)
            }
            EdgeKind::FunctionReturn {
                callee, assignment, ..
            } => {
                let returned = match assignment {
                    Some((target, value)) => {
                        let formula = analyzer.numeral_formula_of(value);
                        let approximated = mentions_unsupported(formula.variables());
                        current
                            .assign(target.clone(), formula, precision)
                            .with_unsupported_feature(approximated)
                    }
                    None => current,
                };
                Some(returned.clear_all(|location| location.is_scoped_in(callee)))
            }
        };
        Ok(successor.map(|successor| {
            let bookkeeping = successor
                .abstraction_state()
                .add_entering_edge(cfa, &self.analyzer, edge);
            successor
                .with_builder(state.builder().clone())
                .with_overflow_detected(probe.hit.load(Ordering::Relaxed))
                .with_abstraction_state(bookkeeping)
        }))
    }
}

/// The sound reaction to a store the analysis cannot resolve: array stores
/// invalidate everything read through arrays and pointers, stores through
/// pointers invalidate everything
fn clobbered(state: &InvariantsState, target: &MemoryLocation) -> InvariantsState {
    let name = target.as_str();
    let cleared = if name.contains('[') && !name.contains('*') && !name.contains("->") {
        state.clear_all(|location| location.is_unsupported_form())
    } else {
        state.clear_all(|_| true)
    };
    cleared.with_unsupported_feature(true)
}

/// Whether any of `variables` stands for an access the analysis cannot
/// resolve
fn mentions_unsupported(variables: BTreeSet<MemoryLocation>) -> bool {
    variables
        .into_iter()
        .any(|location| location.is_unsupported_form())
}
