// Tests for plan building and session execution

use super::*;
use anyhow::anyhow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const INPUT: TagType = TagType::from_static("Input");
const A: TagType = TagType::from_static("A");
const B: TagType = TagType::from_static("B");
const C: TagType = TagType::from_static("C");
const ITEM: TagType = TagType::from_static("Item");
const DETAIL: TagType = TagType::from_static("Detail");
const PAIR: TagType = TagType::from_static("Pair");

type Output = anyhow::Result<RuleOutput<i64>>;

fn rule<F>(name: &str, output: TagType, quantity: Quantity, action: F) -> RuleDefinition<(), i64>
where
    F: Fn(&RuleInput<'_, i64>) -> Output + Send + Sync + 'static,
{
    RuleDefinition::new(
        name,
        output,
        quantity,
        move |_: &(), input: &RuleInput<'_, i64>| -> Output { action(input) },
    )
}

fn increment(name: &str, from: TagType, to: TagType) -> RuleDefinition<(), i64> {
    let source = from.clone();
    rule(name, to, Quantity::Single, move |input| {
        Ok(RuleOutput::single(input.require_tag(&source)? + 1))
    })
    .requires_tag(from)
}

fn split(values: Vec<i64>) -> RuleDefinition<(), i64> {
    rule("Split", ITEM, Quantity::Multiple, move |input| {
        let base = input.require_tag(&INPUT)?;
        Ok(RuleOutput::multiple(
            values.iter().map(|v| base * v).collect(),
        ))
    })
    .requires_tag(INPUT)
}

fn run(rules: Vec<RuleDefinition<(), i64>>, seed: i64) -> Result<SessionOutcome<i64>> {
    let plan = ExecutionPlan::build(rules, [INPUT])?;
    Session::new(&plan, SessionVariables::new()).run(&(), [(INPUT, seed)])
}

fn values(outcome: &SessionOutcome<i64>, tag: &TagType) -> Vec<i64> {
    outcome.values(tag).copied().collect()
}

// ============================================================================
// Plan building
// ============================================================================

#[test]
fn test_plan_orders_producers_before_consumers() {
    let rules = vec![
        increment("ThirdRule", B, C),
        increment("SecondRule", A, B),
        increment("FirstRule", INPUT, A),
    ];
    let plan = ExecutionPlan::build(rules, [INPUT]).unwrap();

    assert_eq!(plan.rule_names(), vec!["FirstRule", "SecondRule", "ThirdRule"]);
    assert!(plan.position("FirstRule") < plan.position("ThirdRule"));
    assert!(plan.produces(&C));
    assert!(!plan.produces(&INPUT));
}

#[test]
fn test_plan_keeps_registration_order_for_independent_rules() {
    let rules = vec![
        increment("Zeta", INPUT, A),
        increment("Alpha", INPUT, B),
        increment("Mid", INPUT, C),
    ];
    let plan = ExecutionPlan::build(rules, [INPUT]).unwrap();
    assert_eq!(plan.rule_names(), vec!["Zeta", "Alpha", "Mid"]);
}

#[test]
fn test_cycle_names_only_rules_on_the_cycle() {
    let rules = vec![
        increment("Entry", INPUT, C),
        increment("Ping", A, B),
        increment("Pong", B, A),
        increment("Downstream", A, ITEM),
    ];
    let err = ExecutionPlan::build(rules, [INPUT]).unwrap_err();

    match &err {
        EngineError::CyclicDependency { rules } => {
            // Downstream is blocked by the cycle but not part of it
            assert_eq!(rules, &["Ping", "Pong"]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
    assert!(err.is_configuration_error());
    assert!(err.to_string().contains("Ping, Pong"));
}

#[test]
fn test_self_dependency_is_a_cycle() {
    let rules = vec![increment("Feedback", A, A)];
    let err = ExecutionPlan::build(rules, [INPUT]).unwrap_err();
    assert!(matches!(err, EngineError::CyclicDependency { ref rules } if rules == &["Feedback"]));
}

#[test]
fn test_duplicate_rule_name_rejected() {
    let rules = vec![increment("Same", INPUT, A), increment("Same", INPUT, B)];
    let err = ExecutionPlan::build(rules, [INPUT]).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateRule(ref name) if name == "Same"));
    assert_eq!(err.rule(), Some("Same"));
}

#[test]
fn test_unsatisfiable_tag_rejected() {
    let rules = vec![increment("Orphan", TagType::new("Nowhere"), A)];
    let err = ExecutionPlan::build(rules, [INPUT]).unwrap_err();

    match err {
        EngineError::UnsatisfiableTag { rule, tag } => {
            assert_eq!(rule, "Orphan");
            assert_eq!(tag.as_str(), "Nowhere");
        }
        other => panic!("expected unsatisfiable tag, got {other:?}"),
    }
}

// ============================================================================
// Session variables
// ============================================================================

#[test]
fn test_missing_variable_fails_before_any_rule_fires() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);

    let rules = vec![
        rule("Counting", A, Quantity::Single, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(RuleOutput::single(1))
        })
        .requires_tag(INPUT),
        rule("Thresholded", B, Quantity::Single, |input| {
            Ok(RuleOutput::single(input.number("baseline")? as i64))
        })
        .requires_tag(A)
        .requires_variable("baseline"),
    ];
    let plan = ExecutionPlan::build(rules, [INPUT]).unwrap();
    let err = Session::new(&plan, SessionVariables::new())
        .run(&(), [(INPUT, 0)])
        .unwrap_err();

    match err {
        EngineError::MissingSessionVariable { rule, variable } => {
            assert_eq!(rule, "Thresholded");
            assert_eq!(variable, "baseline");
        }
        other => panic!("expected missing variable, got {other:?}"),
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_variable_reaches_the_rule() {
    let rules = vec![rule("Thresholded", A, Quantity::Single, |input| {
        let baseline = input.number("baseline")?;
        Ok(RuleOutput::single(input.require_tag(&INPUT)? + baseline as i64))
    })
    .requires_tag(INPUT)
    .requires_variable("baseline")];
    let plan = ExecutionPlan::build(rules, [INPUT]).unwrap();
    let outcome = Session::new(&plan, SessionVariables::new().with("baseline", 1000.0))
        .run(&(), [(INPUT, 5)])
        .unwrap();

    assert_eq!(values(&outcome, &A), vec![1005]);
}

#[test]
fn test_optional_variable_may_be_absent() {
    let rules = vec![rule("Scaled", A, Quantity::Single, |input| {
        let scale = input
            .variable("scale")
            .and_then(VariableValue::as_number)
            .unwrap_or(2.0);
        Ok(RuleOutput::single(input.require_tag(&INPUT)? * scale as i64))
    })
    .requires_tag(INPUT)
    .optional_variable("scale")];

    let outcome = run(rules, 21).unwrap();
    assert_eq!(values(&outcome, &A), vec![42]);
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn test_fault_carries_rule_name_and_snapshot() {
    let rules = vec![
        increment("First", INPUT, A),
        rule("Broken", B, Quantity::Single, |_| Err(anyhow!("boom")))
            .requires_tag(A),
    ];
    let err = run(rules, 1).unwrap_err();

    assert_eq!(err.rule(), Some("Broken"));
    assert!(!err.is_configuration_error());
    match &err {
        EngineError::RuleFault { snapshot, .. } => {
            assert_eq!(snapshot.count(&INPUT), 1);
            assert_eq!(snapshot.count(&A), 1);
            assert_eq!(snapshot.count(&B), 0);
        }
        other => panic!("expected fault, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("Broken"));
    assert!(message.contains("boom"));
    assert!(message.contains("A = [2]"));
}

#[test]
fn test_panicking_action_becomes_fault() {
    let rules = vec![rule("Panicky", A, Quantity::Single, |_| -> Output {
        panic!("kaboom")
    })
    .requires_tag(INPUT)];
    let err = run(rules, 1).unwrap_err();

    assert!(matches!(err, EngineError::RuleFault { ref rule, .. } if rule == "Panicky"));
    assert!(err.to_string().contains("kaboom"));
}

#[test]
fn test_wrong_output_quantity_is_rejected() {
    let rules = vec![
        rule("Liar", A, Quantity::Single, |_| Ok(RuleOutput::multiple(vec![1, 2])))
            .requires_tag(INPUT),
    ];
    let err = run(rules, 1).unwrap_err();

    match err {
        EngineError::OutputMismatch {
            rule,
            declared,
            returned,
        } => {
            assert_eq!(rule, "Liar");
            assert_eq!(declared, Quantity::Single);
            assert_eq!(returned, Quantity::Multiple);
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
}

// ============================================================================
// Fan-out
// ============================================================================

#[test]
fn test_fan_out_fires_once_per_value() {
    let rules = vec![split(vec![1, 2, 3]), increment("Detail", ITEM, DETAIL)];
    let outcome = run(rules, 10).unwrap();

    assert_eq!(values(&outcome, &ITEM), vec![10, 20, 30]);
    assert_eq!(values(&outcome, &DETAIL), vec![11, 21, 31]);
    assert_eq!(outcome.firings(), 4);
}

#[test]
fn test_fan_out_branches_never_cross() {
    let rules = vec![
        split(vec![1, 2]),
        increment("Detail", ITEM, DETAIL),
        rule("Pair", PAIR, Quantity::Single, |input| {
            let item = input.require_tag(&ITEM)?;
            let detail = input.require_tag(&DETAIL)?;
            Ok(RuleOutput::single(item * 1000 + detail))
        })
        .requires_tag(ITEM)
        .requires_tag(DETAIL),
    ];
    let outcome = run(rules, 10).unwrap();

    // 10 pairs with 11 and 20 with 21; never 10 with 21
    assert_eq!(values(&outcome, &PAIR), vec![10_011, 20_021]);
}

#[test]
fn test_seeds_of_one_tag_are_separate_branches() {
    let rules = vec![
        rule("Scale", A, Quantity::Single, |input| {
            Ok(RuleOutput::single(input.require_tag(&INPUT)? * 10))
        })
        .requires_tag(INPUT),
        rule("Sum", B, Quantity::Single, |input| {
            Ok(RuleOutput::single(
                input.require_tag(&A)? + input.require_tag(&INPUT)?,
            ))
        })
        .requires_tag(A)
        .requires_tag(INPUT),
        rule("Offset", ITEM, Quantity::Single, |input| {
            Ok(RuleOutput::single(input.require_tag(&A)? + input.require_tag(&C)?))
        })
        .requires_tag(A)
        .requires_tag(C),
    ];
    let plan = ExecutionPlan::build(rules, [INPUT, C]).unwrap();
    let outcome = Session::new(&plan, SessionVariables::new())
        .run(&(), [(INPUT, 1), (INPUT, 2), (C, 100)])
        .unwrap();

    assert_eq!(values(&outcome, &A), vec![10, 20]);
    // 10 never meets seed 2, nor 20 seed 1
    assert_eq!(values(&outcome, &B), vec![11, 22]);
    // a seed of another tag joins every branch
    assert_eq!(values(&outcome, &ITEM), vec![110, 120]);
}

#[test]
fn test_independent_multiple_tags_expand_cartesian() {
    let left = TagType::from_static("Left");
    let right = TagType::from_static("Right");
    let rules = vec![
        rule("Left", left.clone(), Quantity::Multiple, |_| {
            Ok(RuleOutput::multiple(vec![1, 2]))
        })
        .requires_tag(INPUT),
        rule("Right", right.clone(), Quantity::Multiple, |_| {
            Ok(RuleOutput::multiple(vec![10, 20]))
        })
        .requires_tag(INPUT),
        {
            let (l, r) = (left.clone(), right.clone());
            rule("Sum", PAIR, Quantity::Single, move |input| {
                Ok(RuleOutput::single(
                    input.require_tag(&l)? + input.require_tag(&r)?,
                ))
            })
            .requires_tag(left)
            .requires_tag(right)
        },
    ];
    let outcome = run(rules, 0).unwrap();

    assert_eq!(values(&outcome, &PAIR), vec![11, 21, 12, 22]);
}

#[test]
fn test_absence_propagates_down_one_branch() {
    let rules = vec![
        split(vec![1, 2]),
        rule("Maybe", DETAIL, Quantity::Single, |input| {
            let item = *input.require_tag(&ITEM)?;
            Ok(if item == 20 {
                RuleOutput::nothing()
            } else {
                RuleOutput::single(item)
            })
        })
        .requires_tag(ITEM),
        increment("After", DETAIL, PAIR),
    ];
    let outcome = run(rules, 10).unwrap();

    assert_eq!(values(&outcome, &DETAIL), vec![10]);
    assert_eq!(values(&outcome, &PAIR), vec![11]);
}

#[test]
fn test_empty_multiple_output_skips_downstream() {
    let rules = vec![split(Vec::new()), increment("Detail", ITEM, DETAIL)];
    let outcome = run(rules, 10).unwrap();

    assert!(!outcome.facts().contains_tag(&ITEM));
    assert!(!outcome.facts().contains_tag(&DETAIL));
    assert_eq!(outcome.firings(), 1);
}

#[test]
fn test_rule_without_inputs_fires_once() {
    let rules = vec![rule("Constant", A, Quantity::Single, |_| {
        Ok(RuleOutput::single(42))
    })];
    let outcome = run(rules, 0).unwrap();
    assert_eq!(values(&outcome, &A), vec![42]);
}

#[test]
fn test_lineage_reaches_the_branch_item() {
    let rules = vec![split(vec![1, 2]), increment("Detail", ITEM, DETAIL)];
    let outcome = run(rules, 10).unwrap();
    let facts = outcome.facts();

    for (detail, expected_item) in facts.ids_of(&DETAIL).iter().zip([10, 20]) {
        let item = facts.ancestor(*detail, &ITEM).unwrap();
        assert_eq!(*item.value(), expected_item);
        assert_eq!(*facts.ancestor(*detail, &INPUT).unwrap().value(), 10);
    }
}

// ============================================================================
// Termination and parallelism
// ============================================================================

#[test]
fn test_terminal_tag_stops_the_run() {
    let rules = vec![
        increment("First", INPUT, A),
        increment("Second", A, B),
        increment("Third", B, C),
    ];
    let plan = ExecutionPlan::build(rules, [INPUT]).unwrap();
    let outcome = Session::new(&plan, SessionVariables::new())
        .with_terminal_tag(B)
        .run(&(), [(INPUT, 0)])
        .unwrap();

    assert!(outcome.terminated_early());
    assert_eq!(values(&outcome, &B), vec![2]);
    assert!(!outcome.facts().contains_tag(&C));
}

#[test]
fn test_terminal_tag_in_seed_fires_nothing() {
    let rules = vec![increment("First", INPUT, A)];
    let plan = ExecutionPlan::build(rules, [INPUT]).unwrap();
    let outcome = Session::new(&plan, SessionVariables::new())
        .with_terminal_tag(INPUT)
        .run(&(), [(INPUT, 0)])
        .unwrap();

    assert!(outcome.terminated_early());
    assert_eq!(outcome.firings(), 0);
}

#[test]
fn test_parallel_firings_match_sequential() {
    let factors: Vec<i64> = (1..=50).collect();
    let build = || {
        ExecutionPlan::build(
            vec![
                split(factors.clone()),
                increment("Detail", ITEM, DETAIL),
                rule("Pair", PAIR, Quantity::Single, |input| {
                    Ok(RuleOutput::single(
                        input.require_tag(&ITEM)? * input.require_tag(&DETAIL)?,
                    ))
                })
                .requires_tag(ITEM)
                .requires_tag(DETAIL),
            ],
            [INPUT],
        )
        .unwrap()
    };

    let plan = build();
    let sequential = Session::new(&plan, SessionVariables::new())
        .run(&(), [(INPUT, 3)])
        .unwrap();
    let parallel = Session::new(&plan, SessionVariables::new())
        .with_parallelism(4)
        .run(&(), [(INPUT, 3)])
        .unwrap();

    assert_eq!(values(&sequential, &PAIR), values(&parallel, &PAIR));
    assert_eq!(values(&parallel, &PAIR).len(), 50);
    assert_eq!(sequential.firings(), parallel.firings());
}

#[test]
fn test_parallel_fault_still_aborts() {
    let rules = vec![
        split((1..=8).collect()),
        rule("Fragile", DETAIL, Quantity::Single, |input| {
            let item = *input.require_tag(&ITEM)?;
            if item == 5 {
                return Err(anyhow!("item {item} rejected"));
            }
            Ok(RuleOutput::single(item))
        })
        .requires_tag(ITEM),
    ];
    let plan = ExecutionPlan::build(rules, [INPUT]).unwrap();
    let err = Session::new(&plan, SessionVariables::new())
        .with_parallelism(3)
        .run(&(), [(INPUT, 1)])
        .unwrap_err();

    assert_eq!(err.rule(), Some("Fragile"));
    assert!(err.to_string().contains("item 5 rejected"));
}
