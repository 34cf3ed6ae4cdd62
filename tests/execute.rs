#![cfg(not(feature = "loom"))]

use std::{num::NonZeroUsize, thread};

use fanout::{
    driver::MAX_PROBLEM_SIZE,
    fib_serial,
    prelude::*,
};

fn threads(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

/// The number of child nodes the fork stage creates for `n`.
fn children(n: u32, cutoff: u32) -> usize {
    if n <= cutoff {
        0
    } else {
        2 + children(n - 1, cutoff) + children(n - 2, cutoff)
    }
}

#[test]
fn hard_ceiling_on_one_thread() {
    let config = Config::new(threads(1)).with_ceiling_mode(CeilingMode::Hard);
    let mut scheduler = Scheduler::new(config);
    let execution = scheduler.execute(10).unwrap();
    assert_eq!(execution.value, 55);
    assert!(execution.elapsed > std::time::Duration::ZERO);
    // The driver holds the only slot, so nothing but the root is spawned.
    assert_eq!(execution.spawned, 1);
    assert_eq!(scheduler.governor().active(), 0);
}

#[test]
fn hard_ceiling_on_one_thread_joins_inline() {
    let config = Config::new(threads(1))
        .with_ceiling_mode(CeilingMode::Hard)
        .with_serial_cutoff(2);
    let mut scheduler = Scheduler::new(config);
    let execution = scheduler.execute(10).unwrap();
    assert_eq!(execution.value, 55);
    assert!(execution.nodes > 0);
    assert_eq!(execution.nodes, children(10, 2));
    // Every fork and join after the root runs inline on the root's context.
    assert_eq!(execution.spawned, 1);
    assert_eq!(execution.peak_active, 1);
    assert_eq!(scheduler.governor().active(), 0);
}

#[test]
fn base_case_root_creates_no_children() {
    for parallelism in [1, 3, 16] {
        let execution = execute(1, Config::new(threads(parallelism))).unwrap();
        assert_eq!(execution.value, 1);
        assert_eq!(execution.nodes, 0);
    }
    assert_eq!(execute(0, Config::new(threads(2))).unwrap().value, 0);
}

#[test]
fn soft_ceiling_result_does_not_depend_on_parallelism() {
    for parallelism in [4, 64] {
        let config = Config::new(threads(parallelism)).with_ceiling_mode(CeilingMode::Soft);
        let execution = execute(20, config).unwrap();
        assert_eq!(execution.value, 6765);
    }
}

#[test]
fn every_configuration_agrees_with_the_closed_form() {
    let modes = [CeilingMode::Hard, CeilingMode::Soft];
    let policies = [AdmissionPolicy::Approximate, AdmissionPolicy::Strict];
    for parallelism in [1, 2, 5] {
        for mode in modes {
            for policy in policies {
                for cutoff in [1, 4, 10] {
                    let config = Config::new(threads(parallelism))
                        .with_ceiling_mode(mode)
                        .with_admission(policy)
                        .with_serial_cutoff(cutoff);
                    let mut scheduler = Scheduler::new(config);
                    for n in [0, 1, 2, 3, 11, 17, 24] {
                        let execution = scheduler.execute(n).unwrap();
                        assert_eq!(execution.value, fib_serial(n), "{config:?}, n = {n}");
                        assert_eq!(execution.nodes, children(n, cutoff), "{config:?}, n = {n}");
                        assert_eq!(scheduler.governor().active(), 0);
                    }
                }
            }
        }
    }
}

#[test]
fn largest_supported_problem() {
    let config = Config::new(threads(4)).with_serial_cutoff(80);
    let execution = execute(MAX_PROBLEM_SIZE, config).unwrap();
    assert_eq!(execution.value, 12_200_160_415_121_876_738);

    let too_large = execute(MAX_PROBLEM_SIZE + 1, config);
    assert_eq!(
        too_large,
        Err(ExecuteError::ProblemTooLarge {
            n: MAX_PROBLEM_SIZE + 1,
            max: MAX_PROBLEM_SIZE,
        })
    );
}

#[test]
fn strict_admission_stays_under_the_ceiling() {
    let config = Config::new(threads(4))
        .with_ceiling_mode(CeilingMode::Hard)
        .with_admission(AdmissionPolicy::Strict)
        .with_serial_cutoff(2);
    let mut scheduler = Scheduler::new(config);
    for _ in 0..5 {
        let execution = scheduler.execute(25).unwrap();
        assert_eq!(execution.value, 75_025);
        assert!(execution.peak_active <= config.ceiling());
    }
}

#[test]
fn approximate_admission_overshoot_is_bounded() {
    let parallelism = 4;
    let config = Config::new(threads(parallelism))
        .with_ceiling_mode(CeilingMode::Hard)
        .with_serial_cutoff(2);
    let mut scheduler = Scheduler::new(config);
    for _ in 0..5 {
        let execution = scheduler.execute(25).unwrap();
        assert_eq!(execution.value, 75_025);
        // At most one racing admission per worker thread.
        assert!(execution.peak_active <= config.ceiling() + parallelism);
        assert_eq!(scheduler.governor().active(), 0);
    }
}

#[test]
fn empty_pool_falls_back_to_inline_execution() {
    let config = Config::new(threads(4));
    let mut scheduler = Scheduler::with_thread_pool(config, ThreadPool::new(0));
    let execution = scheduler.execute(22).unwrap();
    assert_eq!(execution.value, 17_711);
    assert_eq!(execution.spawned, 0);
    assert!(execution.rejected >= 1);
    assert_eq!(scheduler.governor().active(), 0);
}

#[test]
fn schedulers_sharing_a_pool_are_isolated() {
    let pool = ThreadPool::new(4);
    let handles: Vec<_> = [(20, CeilingMode::Hard), (27, CeilingMode::Soft)]
        .into_iter()
        .map(|(n, mode)| {
            let config = Config::new(threads(4)).with_ceiling_mode(mode);
            let mut scheduler = Scheduler::with_thread_pool(config, pool.clone());
            thread::spawn(move || {
                for _ in 0..3 {
                    let execution = scheduler.execute(n).unwrap();
                    assert_eq!(execution.value, fib_serial(n));
                    assert_eq!(scheduler.governor().active(), 0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
