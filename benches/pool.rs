use std::hint::black_box;
use std::sync::mpsc;

use corekit::pool::{DebugId, Pool, Priority};
use criterion::{criterion_group, criterion_main, Criterion};

fn dispatch_one_task(c: &mut Criterion) {
	let pool = Pool::new_fixed("bench-dispatch", 4);
	c.bench_function("pool_dispatch_one_task", |b| {
		b.iter(|| {
			let (tx, rx) = mpsc::channel();
			pool.queue(Priority::Low, DebugId::new("bench"), move |_ctx| {
				let _ = tx.send(());
			});
			rx.recv().unwrap();
		})
	});
}

fn dispatch_many_tasks(c: &mut Criterion) {
	let pool = Pool::new_fixed("bench-dispatch-many", 8);
	c.bench_function("pool_dispatch_1000_tasks", |b| {
		b.iter(|| {
			for i in 0..1000 {
				pool.queue(Priority::Low, DebugId::new("bench"), move |_ctx| {
					black_box(i * 2);
				});
			}
			pool.join();
		})
	});
}

criterion_group!(benches, dispatch_one_task, dispatch_many_tasks);
criterion_main!(benches);
