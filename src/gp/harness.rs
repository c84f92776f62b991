//! Behavioural test cases recorded from the seed program.
//!
//! The harness generates deterministic inputs for every top-level function
//! of the reference tree, runs the reference on each, and keeps the cases
//! that complete. A variant is then judged by replaying the same inputs and
//! comparing outputs and fuel.

// Fuel ratios are computed in floating point
#![allow(clippy::cast_precision_loss)]

use crate::error::ExecError;
use crate::gp::CancelToken;
use crate::interp::{self, Budget, Datum, Interpreter};
use crate::syntax::SyntaxTree;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for test-case generation and replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Generated inputs per function.
    pub cases_per_function: usize,
    /// RNG seed for input generation.
    pub seed: u64,
    /// Longest generated input list.
    pub max_list_len: usize,
    /// Fuel available to each reference run.
    pub reference_fuel: u64,
    /// Smallest fuel limit given to a variant's case.
    pub min_fuel: u64,
    /// Variant fuel limit as a multiple of the reference's fuel.
    pub fuel_multiplier: u64,
    /// Wall-clock limit per case, in milliseconds.
    pub case_timeout_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cases_per_function: 8,
            seed: 0x5eed,
            max_list_len: 12,
            reference_fuel: 1_000_000,
            min_fuel: 10_000,
            fuel_multiplier: 4,
            case_timeout_ms: 250,
        }
    }
}

/// One recorded call and the reference's answer to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Function to call.
    pub function: String,
    /// Positional arguments.
    pub args: Vec<Datum>,
    /// Value the reference returned.
    pub expected: Datum,
    /// Output the reference printed.
    pub expected_stdout: String,
    /// Fuel the reference spent.
    pub reference_fuel: u64,
}

/// Outcome of replaying every case against one variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarnessReport {
    /// Fraction of cases with matching output, in [0, 1].
    pub correctness: f64,
    /// Mean fuel ratio against the reference, in [0, 1].
    pub performance: f64,
    /// Cases that ran out of fuel or time.
    pub timeouts: usize,
    /// Cases that raised an error.
    pub failures: usize,
    /// Whether the run was interrupted by cancellation.
    pub cancelled: bool,
}

/// A fixed set of behavioural test cases.
#[derive(Debug, Clone, Default)]
pub struct Harness {
    cases: Vec<TestCase>,
    config: HarnessConfig,
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    IntList,
    SmallInt,
    Mixed,
}

impl Harness {
    /// Build a harness from explicit cases.
    #[must_use]
    pub fn from_cases(cases: Vec<TestCase>, config: HarnessConfig) -> Self {
        Self { cases, config }
    }

    /// Record cases by running `reference` on generated inputs.
    ///
    /// Inputs for which the reference fails or exhausts its budget are
    /// dropped, so a harness can be empty.
    #[must_use]
    pub fn from_reference(reference: &SyntaxTree, config: HarnessConfig) -> Self {
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let mut cases = Vec::new();

        for (function, arity) in reference.function_signatures() {
            let attempts = if arity == 0 { 1 } else { config.cases_per_function };
            let mut seen: Vec<Vec<Datum>> = Vec::new();
            for attempt in 0..attempts {
                let shape = match attempt % 3 {
                    0 => Shape::IntList,
                    1 => Shape::SmallInt,
                    _ => Shape::Mixed,
                };
                let args = generate_args(&mut rng, shape, arity, config.max_list_len);
                if seen.contains(&args) {
                    continue;
                }
                seen.push(args.clone());

                let budget = Budget::with_fuel(config.reference_fuel);
                match interp::run_function(reference, &function, &args, budget) {
                    Ok(run) => cases.push(TestCase {
                        function: function.clone(),
                        args,
                        expected: run.value,
                        expected_stdout: run.stdout,
                        reference_fuel: run.fuel_used,
                    }),
                    Err(err) => debug!(%function, %err, "reference rejected generated input"),
                }
            }
        }

        debug!(cases = cases.len(), "recorded harness cases");
        Self { cases, config }
    }

    /// Recorded cases.
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Configuration used for replay.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Fuel limit for replaying `case`.
    #[must_use]
    pub fn fuel_limit(&self, case: &TestCase) -> u64 {
        case.reference_fuel
            .saturating_mul(self.config.fuel_multiplier)
            .max(self.config.min_fuel)
    }

    fn budget(&self, fuel: u64, cancel: Option<&CancelToken>) -> Budget {
        Budget {
            fuel,
            deadline: Some(Instant::now() + Duration::from_millis(self.config.case_timeout_ms)),
            cancel: cancel.cloned(),
        }
    }

    /// Replay every case against `tree`.
    #[must_use]
    pub fn run(&self, tree: &SyntaxTree, cancel: Option<&CancelToken>) -> HarnessReport {
        let mut report = HarnessReport {
            correctness: 0.0,
            performance: 0.0,
            timeouts: 0,
            failures: 0,
            cancelled: false,
        };

        if self.cases.is_empty() {
            // Nothing to compare against: the module only has to load.
            let mut interp = Interpreter::new(tree, self.budget(self.config.min_fuel, cancel));
            match interp.load() {
                Ok(()) => {
                    report.correctness = 1.0;
                    report.performance = 0.5;
                }
                Err(err) => record_error(&mut report, &err),
            }
            return report;
        }

        let mut passed = 0usize;
        let mut ratio_sum = 0.0;
        for case in &self.cases {
            let budget = self.budget(self.fuel_limit(case), cancel);
            match interp::run_function(tree, &case.function, &case.args, budget) {
                Ok(run) if run.value == case.expected && run.stdout == case.expected_stdout => {
                    passed += 1;
                    let reference = case.reference_fuel as f64;
                    ratio_sum += reference / (reference + run.fuel_used as f64).max(1.0);
                }
                Ok(_) => {}
                Err(err) => {
                    record_error(&mut report, &err);
                    if report.cancelled {
                        break;
                    }
                }
            }
        }

        let total = self.cases.len() as f64;
        report.correctness = passed as f64 / total;
        report.performance = ratio_sum / total;
        report
    }
}

fn record_error(report: &mut HarnessReport, err: &ExecError) {
    match err {
        ExecError::Cancelled => report.cancelled = true,
        err if err.is_timeout() => report.timeouts += 1,
        _ => report.failures += 1,
    }
}

fn generate_args<R: Rng>(rng: &mut R, shape: Shape, arity: usize, max_len: usize) -> Vec<Datum> {
    (0..arity)
        .map(|position| match shape {
            Shape::IntList => int_list(rng, max_len),
            Shape::SmallInt => Datum::Int(rng.gen_range(0..=12)),
            Shape::Mixed if position == 0 => int_list(rng, max_len),
            Shape::Mixed => Datum::Int(rng.gen_range(-5..=12)),
        })
        .collect()
}

fn int_list<R: Rng>(rng: &mut R, max_len: usize) -> Datum {
    let len = rng.gen_range(0..=max_len);
    Datum::List((0..len).map(|_| Datum::Int(rng.gen_range(-20..=20))).collect())
}
