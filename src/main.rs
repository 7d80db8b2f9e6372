// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use workloom::config::{load_and_validate_config, RuntimeBuilder, Settings};
use workloom::engine::{ParallelWork, SeriesWork};
use workloom::observability::init_tracing;
use workloom::tasks::TaskInfo;

const DEFAULT_BRANCHES: u64 = 4;
const NUMBERS_PER_BRANCH: u64 = 250_000;
const GATE: &str = "demo-gate";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("workloom=info");

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: {} [settings.yaml] [branches]", args[0]);
        eprintln!("Example: {} configs/workloom.yaml 8", args[0]);
        std::process::exit(1);
    }

    let settings = match args.get(1) {
        Some(path) => load_and_validate_config(path)
            .with_context(|| format!("loading settings from {}", path))?,
        None => Settings::default(),
    };
    let branches = match args.get(2) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("branch count '{}' is not a number", raw))?,
        None => DEFAULT_BRANCHES,
    }
    .max(1);

    let runtime = RuntimeBuilder::from_config(&settings).context("building runtime")?;

    println!("🚀 workloom task graph demo");
    println!("═══════════════════════════");
    println!("Branches: {}", branches);
    println!();

    let started = Instant::now();
    let partials = Arc::new(Mutex::new(Vec::new()));

    // prepare -> parallel sums -> timer (opens the gate) -> gate counter
    let series = SeriesWork::new(runtime.go_task("prepare", || {}));

    let mut parallel = ParallelWork::new();
    for branch in 0..branches {
        let lo = branch * NUMBERS_PER_BRANCH + 1;
        let hi = (branch + 1) * NUMBERS_PER_BRANCH;
        let mut task = runtime.thread_task("sum", (lo, hi), |&(lo, hi): &(u64, u64), out: &mut u64| {
            *out = (lo..=hi).sum();
        });
        let partials = Arc::clone(&partials);
        task.set_callback(move |task| {
            partials.lock().push((task.input().0, task.take_output()));
        });
        parallel.add_series(SeriesWork::new(task))?;
    }
    parallel.set_callback(|parallel| {
        println!("  ✓ {} branches joined", parallel.len());
    });
    series.push_back(parallel);

    let handle = runtime.handle();
    let mut timer = runtime.timer_task(Duration::from_millis(50));
    timer.set_callback(move |timer| {
        println!("  ✓ timer fired after {:?}", timer.delay());
        handle.count_by_name(GATE, 1);
    });
    series.push_back(timer);

    let mut gate = runtime.named_counter_task(GATE, 1);
    gate.set_callback(|gate| {
        println!("  ✓ gate opened ({})", gate.state());
    });
    series.push_back(gate);

    let partials_for_summary = Arc::clone(&partials);
    series.set_callback(move |_| {
        let mut partials = partials_for_summary.lock();
        partials.sort();
        let total: u64 = partials.iter().map(|(_, sum)| sum).sum();
        println!();
        println!("Sum of 1..={} = {}", branches * NUMBERS_PER_BRANCH, total);
    });

    let done = series.completion();
    series.start()?;
    let outcome = done.await.context("series dropped before finishing")?;

    println!(
        "\n🎉 Graph finished in {:?} (canceled: {})",
        started.elapsed(),
        outcome.canceled
    );
    Ok(())
}
