//! Property-based tests for canonical rendering and tree operators.
//!
//! Programs are generated from a small statement grammar so every input
//! parses. Run with: cargo test --release syntax_roundtrip

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use codevolve::gp::{crossover, CodeVariant, CrossoverConfig, MutationConfig, MutationOperator};
use codevolve::{parse, render};

fn name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "total", "xs", "n"]).prop_map(str::to_string)
}

fn expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        name(),
        (-50i64..50).prop_map(|v| v.to_string()),
        Just("True".to_string()),
        Just("'s'".to_string()),
        Just("[]".to_string()),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(vec!["+", "-", "*", "//", "%", "<", "=="]), inner.clone())
                .prop_map(|(l, op, r)| format!("({l} {op} {r})")),
            inner.clone().prop_map(|e| format!("(-{e})")),
            inner.clone().prop_map(|e| format!("(not {e})")),
            inner.clone().prop_map(|e| format!("len([{e}])")),
            (inner.clone(), inner).prop_map(|(a, b)| format!("[{a}, {b}]")),
        ]
    })
}

fn statement(indent: usize) -> impl Strategy<Value = String> {
    let pad = "    ".repeat(indent);
    let inner = " ".repeat(4 * (indent + 1));
    prop_oneof![
        (name(), expr()).prop_map({
            let pad = pad.clone();
            move |(n, e)| format!("{pad}{n} = {e}\n")
        }),
        (name(), expr()).prop_map({
            let pad = pad.clone();
            move |(n, e)| format!("{pad}{n} += {e}\n")
        }),
        (expr(), name(), expr()).prop_map({
            let (pad, inner) = (pad.clone(), inner.clone());
            move |(c, n, e)| format!("{pad}if {c}:\n{inner}{n} = {e}\n{pad}else:\n{inner}pass\n")
        }),
        (name(), name(), expr()).prop_map({
            let (pad, inner) = (pad.clone(), inner.clone());
            move |(v, n, e)| format!("{pad}for {v} in xs:\n{inner}{n} = {e}\n")
        }),
        expr().prop_map(move |e| format!("{pad}print({e})\n")),
    ]
}

fn program() -> impl Strategy<Value = String> {
    (prop::collection::vec(statement(1), 1..6), expr()).prop_map(|(body, ret)| {
        format!("def f(xs):\n    a = 0\n    b = 1\n    total = 0\n    n = 2\n{}    return {ret}\n", body.concat())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Rendering a parsed program is a fixed point.
    #[test]
    fn prop_render_is_fixed_point(source in program()) {
        let canonical = render(&parse(&source).unwrap());
        let again = render(&parse(&canonical).unwrap());
        prop_assert_eq!(again, canonical);
    }

    /// Mutation output always parses.
    #[test]
    fn prop_mutation_output_parses(source in program(), seed in any::<u64>()) {
        let op = MutationOperator::new(&MutationConfig { rate: 1.0, ..MutationConfig::default() });
        let mut rng = SmallRng::seed_from_u64(seed);
        let child = op.mutate(&CodeVariant::new(source), &mut rng);
        prop_assert!(parse(child.source()).is_ok(), "unparseable child:\n{}", child.source());
    }

    /// Crossover output always parses and is unscored.
    #[test]
    fn prop_crossover_output_parses(a in program(), b in program(), seed in any::<u64>()) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let child = crossover(
            &CodeVariant::new(a),
            &CodeVariant::new(b),
            &CrossoverConfig::default(),
            &mut rng,
        );
        prop_assert!(parse(child.source()).is_ok(), "unparseable child:\n{}", child.source());
        prop_assert!(!child.fitness().is_scored());
    }
}
