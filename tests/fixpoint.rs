use interval_invariants::{
    analyzer::EdgeAnalyzer,
    cfg::{Cfa, EdgeKind, LocationId},
    expr::{BinaryOperator, Expression},
    formula::{FormulaBuilder, MemoryLocation},
    machine::{MachineModel, SourceIntType},
    manager::CompoundIntervalManagerFactory,
    precision::InvariantsPrecision,
    state::InvariantsState,
    transfer::EdgeTransfer,
};
use num_bigint::BigInt;
use std::collections::VecDeque;

fn int_type() -> interval_invariants::bitvector::TypeInfo {
    MachineModel::lp64().type_info(SourceIntType::Int)
}

fn variable(name: &str) -> Expression {
    Expression::Variable {
        type_info: int_type(),
        location: MemoryLocation::new(name),
    }
}

fn literal(value: i64) -> Expression {
    Expression::Literal {
        type_info: int_type(),
        value: BigInt::from(value),
    }
}

fn binary(operator: BinaryOperator, op1: Expression, op2: Expression) -> Expression {
    Expression::Binary {
        type_info: int_type(),
        operator,
        op1: Box::new(op1),
        op2: Box::new(op2),
    }
}

/// Chaotic iteration to a fixpoint, widening whenever a location is updated
/// and the strategy allows it. Returns one state per location, `None` for
/// unreachable ones.
fn run_fixpoint(
    cfa: &Cfa,
    entry: LocationId,
    precision: &InvariantsPrecision,
) -> Vec<Option<InvariantsState>> {
    let builder = FormulaBuilder::new(CompoundIntervalManagerFactory::default());
    let transfer = EdgeTransfer::new(EdgeAnalyzer::new(builder.clone()));
    let mut states: Vec<Option<InvariantsState>> = vec![None; cfa.location_count()];
    states[entry.0] = Some(InvariantsState::initial(builder, precision));
    let mut worklist = VecDeque::from([entry]);
    while let Some(location) = worklist.pop_front() {
        let state = match &states[location.0] {
            Some(state) => state.clone(),
            None => continue,
        };
        for &edge in cfa.leaving_edges(location) {
            let successor = match transfer.successor(&state, cfa, edge, precision).unwrap() {
                Some(successor) => successor,
                None => continue,
            };
            let target = cfa.edge(edge).successor;
            let merged = match &states[target.0] {
                None => successor,
                Some(existing) => {
                    if successor.is_less_or_equal(existing) {
                        continue;
                    }
                    let joined = successor.join(existing, precision);
                    if joined.abstraction_state().perform_abstraction() {
                        joined.widen(existing, precision)
                    } else {
                        joined
                    }
                }
            };
            states[target.0] = Some(merged);
            worklist.push_back(target);
        }
    }
    states
}

/// int i = 0; while (i < 100) i = i + 1;
fn counting_loop() -> (Cfa, LocationId, LocationId, LocationId) {
    let mut cfa = Cfa::new();
    let entry = cfa.add_location("main");
    let head = cfa.add_location("main");
    let body = cfa.add_location("main");
    let exit = cfa.add_location("main");
    cfa.add_edge(
        entry,
        head,
        EdgeKind::Declaration {
            variable: MemoryLocation::new("i"),
            type_info: int_type(),
            initializer: Some(literal(0)),
        },
    )
    .unwrap();
    let guard = binary(BinaryOperator::LessThan, variable("i"), literal(100));
    cfa.add_edge(
        head,
        body,
        EdgeKind::Assume {
            condition: guard.clone(),
            assumed: true,
        },
    )
    .unwrap();
    cfa.add_edge(
        head,
        exit,
        EdgeKind::Assume {
            condition: guard,
            assumed: false,
        },
    )
    .unwrap();
    cfa.add_edge(
        body,
        head,
        EdgeKind::Statement {
            lhs: variable("i"),
            rhs: binary(BinaryOperator::Add, variable("i"), literal(1)),
        },
    )
    .unwrap();
    (cfa, entry, head, exit)
}

#[test]
fn counting_loop_terminates_with_a_sound_exit_invariant() {
    let precision = InvariantsPrecision::default();
    let (cfa, entry, head, exit) = counting_loop();
    let states = run_fixpoint(&cfa, entry, &precision);
    let i = MemoryLocation::new("i");

    let at_head = states[head.0].as_ref().expect("loop head is reachable");
    let head_values = at_head.evaluate_variable(&i);
    assert!(head_values.contains_value(&BigInt::from(0)));
    assert!(head_values.contains_value(&BigInt::from(99)));
    assert_eq!(head_values.lower_bound(), Some(&BigInt::from(0)));

    let at_exit = states[exit.0].as_ref().expect("loop exit is reachable");
    let exit_values = at_exit.evaluate_variable(&i);
    // the loop leaves i at exactly 100; widening may lose the upper bound
    // but never the fact that the guard failed
    assert_eq!(exit_values.lower_bound(), Some(&BigInt::from(100)));
    assert!(exit_values.contains_value(&BigInt::from(100)));
    assert!(!exit_values.contains_value(&BigInt::from(99)));
}

#[test]
fn wrapping_counter_keeps_the_guard_bound_through_widening() {
    // int i = 0; while (i < 100) i = (i + 1) % 100;  the loop never exits
    let precision = InvariantsPrecision::default();
    let mut cfa = Cfa::new();
    let entry = cfa.add_location("main");
    let head = cfa.add_location("main");
    let body = cfa.add_location("main");
    let exit = cfa.add_location("main");
    cfa.add_edge(
        entry,
        head,
        EdgeKind::Declaration {
            variable: MemoryLocation::new("i"),
            type_info: int_type(),
            initializer: Some(literal(0)),
        },
    )
    .unwrap();
    let guard = binary(BinaryOperator::LessThan, variable("i"), literal(100));
    cfa.add_edge(
        head,
        body,
        EdgeKind::Assume {
            condition: guard.clone(),
            assumed: true,
        },
    )
    .unwrap();
    cfa.add_edge(
        head,
        exit,
        EdgeKind::Assume {
            condition: guard,
            assumed: false,
        },
    )
    .unwrap();
    cfa.add_edge(
        body,
        head,
        EdgeKind::Statement {
            lhs: variable("i"),
            rhs: binary(
                BinaryOperator::Modulo,
                binary(BinaryOperator::Add, variable("i"), literal(1)),
                literal(100),
            ),
        },
    )
    .unwrap();
    let states = run_fixpoint(&cfa, entry, &precision);

    // widening overshoots to the type range, but the guard was collected as
    // a widening hint and gets re-assumed, so the head keeps the exact bound
    let at_head = states[head.0].as_ref().expect("loop head is reachable");
    assert_eq!(
        at_head.evaluate_variable(&MemoryLocation::new("i")),
        interval_invariants::compound::CompoundInterval::of(
            interval_invariants::interval::SimpleInterval::of(0, 99)
        )
    );
    assert!(states[exit.0].is_none());
}

#[test]
fn branches_join_and_dead_code_stays_dead() {
    let precision = InvariantsPrecision::default();
    let mut cfa = Cfa::new();
    let entry = cfa.add_location("main");
    let branch = cfa.add_location("main");
    let then_arm = cfa.add_location("main");
    let else_arm = cfa.add_location("main");
    let merge = cfa.add_location("main");
    let dead = cfa.add_location("main");
    cfa.add_edge(
        entry,
        branch,
        EdgeKind::Declaration {
            variable: MemoryLocation::new("x"),
            type_info: int_type(),
            initializer: Some(literal(0)),
        },
    )
    .unwrap();
    let condition = binary(BinaryOperator::Equal, variable("x"), literal(0));
    cfa.add_edge(
        branch,
        then_arm,
        EdgeKind::Assume {
            condition: condition.clone(),
            assumed: true,
        },
    )
    .unwrap();
    cfa.add_edge(
        branch,
        else_arm,
        EdgeKind::Assume {
            condition,
            assumed: false,
        },
    )
    .unwrap();
    cfa.add_edge(
        then_arm,
        merge,
        EdgeKind::Statement {
            lhs: variable("y"),
            rhs: literal(1),
        },
    )
    .unwrap();
    cfa.add_edge(
        else_arm,
        merge,
        EdgeKind::Statement {
            lhs: variable("y"),
            rhs: literal(2),
        },
    )
    .unwrap();
    cfa.add_edge(else_arm, dead, EdgeKind::Blank).unwrap();
    let states = run_fixpoint(&cfa, entry, &precision);

    // x is known to be zero, so the else branch is never taken
    assert!(states[else_arm.0].is_none());
    assert!(states[dead.0].is_none());
    let at_merge = states[merge.0].as_ref().expect("merge is reachable");
    assert_eq!(
        at_merge.evaluate_variable(&MemoryLocation::new("y")),
        interval_invariants::compound::CompoundInterval::singleton(1)
    );
}

#[test]
fn calls_pass_arguments_and_returns_scrub_locals() {
    let precision = InvariantsPrecision::default();
    let mut cfa = Cfa::new();
    let entry = cfa.add_location("main");
    let before_call = cfa.add_location("main");
    let in_callee = cfa.add_location("twice");
    let after_body = cfa.add_location("twice");
    let after_call = cfa.add_location("main");
    cfa.add_edge(
        entry,
        before_call,
        EdgeKind::Declaration {
            variable: MemoryLocation::new("a"),
            type_info: int_type(),
            initializer: Some(literal(21)),
        },
    )
    .unwrap();
    let parameter = MemoryLocation::scoped("twice", "n");
    cfa.add_edge(
        before_call,
        in_callee,
        EdgeKind::FunctionCall {
            callee: "twice".to_string(),
            parameters: vec![(parameter.clone(), variable("a"))],
        },
    )
    .unwrap();
    let result = MemoryLocation::scoped("twice", "result");
    cfa.add_edge(
        in_callee,
        after_body,
        EdgeKind::Statement {
            lhs: Expression::Variable {
                type_info: int_type(),
                location: result.clone(),
            },
            rhs: binary(
                BinaryOperator::Multiply,
                Expression::Variable {
                    type_info: int_type(),
                    location: parameter.clone(),
                },
                literal(2),
            ),
        },
    )
    .unwrap();
    cfa.add_edge(
        after_body,
        after_call,
        EdgeKind::FunctionReturn {
            callee: "twice".to_string(),
            assignment: Some((
                MemoryLocation::new("r"),
                Expression::Variable {
                    type_info: int_type(),
                    location: result.clone(),
                },
            )),
            call_location: before_call,
        },
    )
    .unwrap();
    let states = run_fixpoint(&cfa, entry, &precision);

    let done = states[after_call.0].as_ref().expect("call returns");
    assert_eq!(
        done.evaluate_variable(&MemoryLocation::new("r")),
        interval_invariants::compound::CompoundInterval::singleton(42)
    );
    assert!(done.evaluate_variable(&result).is_top());
    assert!(done.evaluate_variable(&parameter).is_top());
}
