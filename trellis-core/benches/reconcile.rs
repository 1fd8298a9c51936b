//! Benchmarks for the render pipeline
//!
//! Measures full mounts, unkeyed list diffs and signal-driven node updates
//! against the in-memory host document.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trellis_core::fiber::{mount, Element, Props, RenderResult, Scope};
use trellis_core::host::MemoryDocument;
use trellis_core::reactive::{Computed, Scheduler, Signal};

fn list(_: &Scope, props: &Props) -> RenderResult {
    let count = props.get_number("count").unwrap_or(0.0) as usize;
    let offset = props.get_number("offset").unwrap_or(0.0) as usize;
    Ok(Element::new("ul").children((0..count).map(|i| {
        Element::new("li")
            .attr("className", if (i + offset) % 2 == 0 { "even" } else { "odd" })
            .with_text(format!("row {}", i + offset))
    })))
}

fn bench_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("mount");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let doc = MemoryDocument::new();
                let container = doc.create_container("main");
                let root = mount(list, doc.target(container), Props::new().with("count", size as f64));
                root.run_until_idle().unwrap();
                black_box(doc.node_count())
            });
        });
    }

    group.finish();
}

fn bench_rerender(c: &mut Criterion) {
    let mut group = c.benchmark_group("rerender");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let doc = MemoryDocument::new();
            let container = doc.create_container("main");
            let root = mount(list, doc.target(container), Props::new().with("count", size as f64));
            root.run_until_idle().unwrap();

            let mut offset = 0.0;
            b.iter(|| {
                offset += 1.0;
                root.render(Element::component(
                    list,
                    Props::new().with("count", size as f64).with("offset", offset),
                ));
                root.run_until_idle().unwrap();
                black_box(doc.mutation_count())
            });
        });
    }

    group.finish();
}

fn bench_signal_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_update");

    group.bench_function("computed_chain_10", |b| {
        let base = Signal::new(0_u64);
        let mut last = {
            let base = base.clone();
            Computed::new(move || base.get() + 1)
        };
        let mut chain = Vec::new();
        for _ in 0..9 {
            let prev = last.clone();
            chain.push(last);
            last = Computed::new(move || prev.get() + 1);
        }

        b.iter(|| {
            base.update(|v| *v += 1);
            Scheduler::run_microtasks().unwrap();
            black_box(last.peek())
        });
    });

    group.bench_function("entangled_node", |b| {
        let doc = MemoryDocument::new();
        let container = doc.create_container("main");
        let signal = Signal::new(0_u64);
        let root = {
            let signal = signal.clone();
            mount(
                move |_, _| Ok(Element::new("span").with_text(signal.get().to_string())),
                doc.target(container),
                Props::new(),
            )
        };
        root.run_until_idle().unwrap();

        b.iter(|| {
            signal.update(|v| *v += 1);
            root.run_until_idle().unwrap();
            black_box(doc.mutation_count())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_mount, bench_rerender, bench_signal_update);
criterion_main!(benches);
