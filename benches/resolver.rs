use std::time::{Duration, Instant};

use chrono::NaiveDate;

use reeltime::calendar::{add_days, CalendarDate};
use reeltime::engine::{find_gaps, resolve};
use reeltime::model::*;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

/// `n` vouchers with staggered month-long windows, all enabled.
fn vouchers(n: usize, base: CalendarDate) -> Vec<Voucher> {
    (0..n)
        .map(|i| {
            let start = add_days(base, (i % 90) as i64);
            Voucher {
                id: format!("v{i:06}").into(),
                code: format!("V{i}"),
                name: format!("voucher {i}"),
                interval: Interval::new(start, add_days(start, 30)),
                status: VoucherStatus::Enabled,
                lines: Vec::new(),
            }
        })
        .collect()
}

fn bench_resolve(n: usize, rounds: usize) {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let today = add_days(base, 45);
    let input = vouchers(n, base);
    let mut latencies = Vec::with_capacity(rounds);
    let mut changes = 0;
    for _ in 0..rounds {
        let started = Instant::now();
        let resolution = resolve(&input, today);
        latencies.push(started.elapsed());
        changes = resolution.changes.len();
    }
    print_latency(&format!("resolve n={n} ({changes} diffs)"), &mut latencies);
}

fn bench_gaps(n: usize, rounds: usize) {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let intervals: Vec<Interval> = (0..n)
        .rev()
        .map(|i| {
            let start = add_days(base, (i * 10) as i64);
            Interval::new(start, add_days(start, 7))
        })
        .collect();
    let mut latencies = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let started = Instant::now();
        let gaps = find_gaps(&intervals);
        latencies.push(started.elapsed());
        assert_eq!(gaps.len(), n - 1);
    }
    print_latency(&format!("find_gaps n={n}"), &mut latencies);
}

fn main() {
    println!("reeltime resolver bench");
    for n in [10, 100, 1_000] {
        bench_resolve(n, 200);
    }
    for n in [100, 10_000] {
        bench_gaps(n, 200);
    }
}
