#![no_main]

use arbitrary::Arbitrary;
use codevolve::gp::{CodeVariant, MutationConfig, MutationOperator};
use codevolve::interp::{run_function, Budget, Datum};
use libfuzzer_sys::fuzz_target;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Structured input for mutation fuzzing.
#[derive(Arbitrary, Debug)]
struct MutateInput {
    /// Program text.
    source: String,
    /// RNG seed for site choice.
    seed: u64,
    /// Integers passed as a list argument.
    values: Vec<i16>,
}

fuzz_target!(|input: MutateInput| {
    if input.source.len() > 2048 {
        return;
    }
    let variant = CodeVariant::new(input.source);
    let Ok(tree) = variant.tree() else {
        return;
    };

    let op = MutationOperator::new(&MutationConfig {
        rate: 1.0,
        ..MutationConfig::default()
    });
    let mut rng = SmallRng::seed_from_u64(input.seed);
    let mutated = op.mutate(&variant, &mut rng);
    let mutated_tree = mutated.tree().expect("mutation output must parse");

    // Rewrites preserve behaviour wherever the original completes.
    let args = [Datum::List(input.values.iter().map(|&v| Datum::Int(i64::from(v))).collect())];
    for name in tree.function_names() {
        let Ok(before) = run_function(tree, &name, &args, Budget::with_fuel(20_000)) else {
            continue;
        };
        match run_function(mutated_tree, &name, &args, Budget::with_fuel(80_000)) {
            Ok(after) => {
                assert_eq!(before.value, after.value, "rewrite changed the result of {name}");
                assert_eq!(before.stdout, after.stdout, "rewrite changed the output of {name}");
            }
            Err(err) if err.is_timeout() => {}
            Err(err) => panic!("rewrite made {name} fail: {err}\n{}", mutated.source()),
        }
    }
});
