use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;

use crusher_replay::{Action, InMemoryGateway, Resolver, TestId};

/// Chain of `depth` tests, each referencing the next and adding `width` clicks
fn chain(depth: u64, width: usize) -> InMemoryGateway {
    let gateway = InMemoryGateway::new();
    for id in 1..=depth {
        let mut actions = vec![Action::set_device("GoogleChromeLargeScreen")];
        if id < depth {
            actions.push(Action::run_after_test(id + 1));
        }
        actions.extend((0..width).map(|i| Action::click(&format!("#t{}-{}", id, i))));
        gateway.insert_test(id, actions);
    }
    gateway
}

fn benchmark_resolve(c: &mut Criterion) {
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(e) => panic!("failed to build runtime: {}", e),
    };

    let resolver = Resolver::new(Arc::new(chain(32, 20)));
    c.bench_function("resolve_chain_32x20", |b| {
        b.iter(|| {
            let flat = runtime.block_on(resolver.resolve_test(black_box(&TestId::from(1))));
            assert!(matches!(flat, Ok(ref actions) if actions.len() == 32 * 20 + 1));
        })
    });

    let flat_recording: Vec<Action> = (0..500).map(|i| Action::click(&format!("#b{}", i))).collect();
    c.bench_function("resolve_flat_500", |b| {
        b.iter(|| {
            let flat = runtime.block_on(resolver.resolve(black_box(&flat_recording), true));
            assert!(flat.is_ok());
        })
    });
}

criterion_group!(benches, benchmark_resolve);
criterion_main!(benches);
