//! Flush path benchmarks.
//!
//! - Coalesced writes: N increments, one flush
//! - Read-forced flush: write then synchronous read
//! - Draft mutation on a growing list

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use slicekit_core::{Exports, Hooks, Result, Runtime, Take};

fn counter(hooks: &Hooks) -> Result<Exports> {
    let (count, setter) = hooks.state(0)?;
    let increment = hooks.callback(
        move |_| setter.update(|prev| json!(prev.as_i64().unwrap_or(0) + 1)),
        &[],
    )?;
    let doubled = hooks.memo(|| json!(count.as_i64().unwrap_or(0) * 2), &[count.clone()])?;
    Ok(Exports::new()
        .value("count", count)
        .value("doubled", doubled)
        .callback("increment", increment))
}

fn todos(hooks: &Hooks) -> Result<Exports> {
    let (items, setter) = hooks.state(json!([]))?;
    let add = hooks.callback(
        move |title| {
            setter.mutate(move |draft| {
                if let Some(list) = draft.as_array_mut() {
                    list.push(json!({ "title": title, "done": false }));
                }
            })
        },
        &[],
    )?;
    Ok(Exports::new().value("items", items).callback("add", add))
}

fn ready(looper: fn(&Hooks) -> Result<Exports>) -> (Runtime, Take) {
    let runtime = Runtime::new();
    let take = runtime.create_slice("bench", looper).unwrap();
    runtime.run_until_stalled();
    (runtime, take)
}

fn bench_coalesced_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush/coalesced");
    for writes in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(writes), &writes, |b, &writes| {
            let (runtime, take) = ready(counter);
            let increment = take.read().unwrap().callback("increment").unwrap();
            b.iter(|| {
                for _ in 0..writes {
                    increment.call(Value::Null);
                }
                runtime.run_until_stalled();
            });
        });
    }
    group.finish();
}

fn bench_read_forced_flush(c: &mut Criterion) {
    c.bench_function("flush/read_forced", |b| {
        let (_runtime, take) = ready(counter);
        b.iter(|| {
            take.call("increment", Value::Null).unwrap();
            black_box(take.get("doubled").unwrap())
        });
    });
}

fn bench_draft_mutation(c: &mut Criterion) {
    c.bench_function("flush/draft_push", |b| {
        let (runtime, take) = ready(todos);
        b.iter(|| {
            take.call("add", "write benchmarks").unwrap();
            runtime.run_until_stalled();
        });
    });
}

criterion_group!(benches, bench_coalesced_writes, bench_read_forced_flush, bench_draft_mutation);
criterion_main!(benches);
