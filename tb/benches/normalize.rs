//! Benchmarks for duration normalization and incremental step scanning

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use taskbreaker::pipeline::stream::canned_json;
use taskbreaker::pipeline::{Language, Step, StepScanner, StepType, normalize};

fn bench_normalize(c: &mut Criterion) {
    let steps: Vec<Step> = (1..=12)
        .map(|i| Step::new(format!("Step {}", i), i, i * 3, StepType::Mental, 0))
        .collect();

    c.bench_function("normalize_12_steps", |bench| {
        bench.iter(|| black_box(normalize(steps.clone(), 450, 0.15)))
    });
}

fn bench_scanner(c: &mut Criterion) {
    let json = canned_json(Language::English);
    let chars: Vec<char> = json.chars().collect();
    let deltas: Vec<String> = chars.chunks(7).map(|c| c.iter().collect()).collect();

    c.bench_function("scan_template_7_char_deltas", |bench| {
        bench.iter(|| {
            let mut scanner = StepScanner::new();
            let mut found = 0;
            for delta in &deltas {
                found += scanner.push(delta).len();
            }
            black_box(found)
        })
    });
}

criterion_group!(benches, bench_normalize, bench_scanner);
criterion_main!(benches);
