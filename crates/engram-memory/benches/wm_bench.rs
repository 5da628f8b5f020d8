use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use engram_memory::{ContextStrategy, WmAdd, WorkingMemory};

fn fill(wm: &WorkingMemory, entries: usize) {
    for i in 0..entries {
        let _ = wm.add(WmAdd {
            node_id: i as i64,
            content: format!("entry number {i} with some filler text"),
            token_count: 10,
            access_count: (i % 7) as i64,
            last_accessed: Utc::now() - chrono::Duration::minutes(i as i64),
            from_recall: false,
        });
    }
}

fn bench_add_with_eviction(c: &mut Criterion) {
    c.bench_function("wm_add_with_eviction", |b| {
        let wm = WorkingMemory::new(1_000);
        fill(&wm, 100);
        let mut next = 1_000i64;
        b.iter(|| {
            let _ = wm.add(WmAdd {
                node_id: next,
                content: "fresh entry".into(),
                token_count: 10,
                access_count: 0,
                last_accessed: Utc::now(),
                from_recall: false,
            });
            next += 1;
        });
    });
}

fn bench_assemble_context(c: &mut Criterion) {
    c.bench_function("wm_assemble_balanced", |b| {
        let wm = WorkingMemory::new(10_000);
        fill(&wm, 500);
        b.iter(|| wm.assemble_context(ContextStrategy::Balanced, None));
    });
}

criterion_group!(benches, bench_add_with_eviction, bench_assemble_context);
criterion_main!(benches);
