//! Property-based tests: the engine against a sequential reference.
//!
//! Each test builds ONE scanner and reuses it across all cases so the worker
//! pool and scratch pool are shared, the way a long-lived caller uses them.

mod common;

use common::{approx_eq, reference_exclusive, reference_inclusive, tiny_block_scanner};
use forge_primitives::LaunchOrder;
use forge_scan::Scanner;
use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};

const NUM_CASES: u32 = 64;
const MAX_N: usize = 100_000;

fn default_scanner() -> Scanner {
    common::parallel_scanner(4)
}

fn u32_input() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..10_000, 0..=MAX_N)
}

#[test]
fn prop_inclusive_matches_reference() {
    let scanner = default_scanner();
    let mut runner = TestRunner::new(Config {
        cases: NUM_CASES,
        ..Config::default()
    });

    runner
        .run(&u32_input(), |input| {
            let (expected, expected_total) = reference_inclusive(&input);
            let mut out = vec![0u32; input.len()];
            let total = scanner.inclusive_sum(input.len(), &input, &mut out).unwrap();
            prop_assert_eq!(total, expected_total);
            prop_assert_eq!(out, expected);
            Ok(())
        })
        .unwrap();
}

#[test]
fn prop_exclusive_matches_reference_small_blocks() {
    let scanner = tiny_block_scanner(4, 4, 2, 3, LaunchOrder::Shuffled { seed: 99 });
    let mut runner = TestRunner::new(Config {
        cases: NUM_CASES,
        ..Config::default()
    });

    runner
        .run(&prop::collection::vec(-500i64..500, 0..20_000), |input| {
            let (expected, expected_total) = reference_exclusive(&input);
            let mut out = vec![0i64; input.len()];
            let total = scanner.exclusive_sum(input.len(), &input, &mut out).unwrap();
            prop_assert_eq!(total, expected_total);
            prop_assert_eq!(out, expected);
            Ok(())
        })
        .unwrap();
}

#[test]
fn prop_total_independent_of_geometry() {
    let shapes = [
        tiny_block_scanner(4, 2, 1, 1, LaunchOrder::Reversed),
        tiny_block_scanner(4, 8, 5, 2, LaunchOrder::InOrder),
        default_scanner(),
    ];
    let mut runner = TestRunner::new(Config {
        cases: NUM_CASES / 2,
        ..Config::default()
    });

    runner
        .run(&prop::collection::vec(0u32..100, 1..5_000), |input| {
            let mut reference = vec![0u32; input.len()];
            let reference_total = shapes[0]
                .inclusive_sum(input.len(), &input, &mut reference)
                .unwrap();
            for scanner in &shapes[1..] {
                let mut out = vec![0u32; input.len()];
                let total = scanner.inclusive_sum(input.len(), &input, &mut out).unwrap();
                prop_assert_eq!(total, reference_total);
                prop_assert_eq!(&out, &reference);
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn prop_f64_within_epsilon() {
    let scanner = tiny_block_scanner(4, 8, 2, 2, LaunchOrder::Shuffled { seed: 5 });
    let mut runner = TestRunner::new(Config {
        cases: NUM_CASES,
        ..Config::default()
    });

    runner
        .run(&prop::collection::vec(-1.0e3f64..1.0e3, 0..10_000), |input| {
            let (expected, expected_total) = reference_inclusive(&input);
            let mut out = vec![0.0f64; input.len()];
            let total = scanner.inclusive_sum(input.len(), &input, &mut out).unwrap();
            // Partial sums of mixed-sign values can cancel, so compare against
            // the magnitude of the whole input rather than of each result.
            let scale: f64 = input.iter().map(|x| x.abs()).sum::<f64>().max(1.0);
            prop_assert!(approx_eq(total / scale, expected_total / scale, 1e-10));
            for (a, b) in out.iter().zip(expected.iter()) {
                prop_assert!(approx_eq(a / scale, b / scale, 1e-10), "{} vs {}", a, b);
            }
            Ok(())
        })
        .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_single_element(x in any::<i32>()) {
        let scanner = tiny_block_scanner(2, 4, 1, 1, LaunchOrder::InOrder);
        let mut out = [0i32];
        prop_assert_eq!(scanner.inclusive_sum(1, &[x], &mut out).unwrap(), x);
        prop_assert_eq!(out[0], x);
        prop_assert_eq!(scanner.exclusive_sum(1, &[x], &mut out).unwrap(), x);
        prop_assert_eq!(out[0], 0);
    }
}
