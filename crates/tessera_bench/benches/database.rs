//! Database operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera_bench::utils::{generate_tasks, populated_db};
use tessera_core::Value;
use tessera_testkit::fixtures::{open_db, task_schema, task_values};

/// Benchmark single object writes.
fn bench_single_write(c: &mut Criterion) {
    c.bench_function("single_write", |b| {
        let db = open_db(task_schema());
        let mut next_id = 0i64;

        b.iter(|| {
            next_id += 1;
            db.write(|txn| txn.create("Task", black_box(task_values(next_id, "bench", 1, 1))))
                .unwrap();
        });
    });
}

/// Benchmark batch writes.
fn bench_batch_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_write");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || (open_db(task_schema()), generate_tasks(1, batch_size)),
                    |(db, rows)| {
                        db.write(|txn| {
                            for row in rows {
                                txn.create("Task", row)?;
                            }
                            Ok(())
                        })
                        .unwrap();
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

/// Benchmark primary key lookups in a populated database.
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for count in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let db = populated_db(count);
            let mut key = 0i64;

            b.iter(|| {
                key = key % count as i64 + 1;
                let result = db.object("Task", black_box(key)).unwrap();
                black_box(result);
            });
        });
    }
    group.finish();
}

/// Benchmark transaction overhead (empty transaction).
fn bench_transaction_overhead(c: &mut Criterion) {
    c.bench_function("transaction_overhead", |b| {
        let db = open_db(task_schema());

        b.iter(|| {
            db.write(|_txn| Ok(())).unwrap();
        });
    });
}

/// Benchmark updates with one observer attached.
fn bench_observed_update(c: &mut Criterion) {
    c.bench_function("observed_update", |b| {
        let db = populated_db(1000);
        let task = db.object("Task", 1).unwrap().unwrap();
        let _token = db
            .objects("Task")
            .unwrap()
            .sorted("priority")
            .unwrap()
            .observe(|_, change| {
                black_box(change);
            })
            .unwrap();
        let mut priority = 0i64;

        b.iter(|| {
            priority = (priority + 1) % 10;
            db.write(|txn| txn.set(&task, "priority", Value::Int(priority)))
                .unwrap();
        });
    });
}

/// Benchmark object deletion.
fn bench_delete(c: &mut Criterion) {
    c.bench_function("delete", |b| {
        let db = open_db(task_schema());
        let mut next_id = 0i64;

        b.iter_batched(
            || {
                next_id += 1;
                db.write(|txn| txn.create("Task", task_values(next_id, "doomed", 1, 1)))
                    .unwrap()
            },
            |task| {
                db.write(|txn| txn.delete(black_box(&task))).unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_single_write,
    bench_batch_write,
    bench_lookup,
    bench_transaction_overhead,
    bench_observed_update,
    bench_delete,
);
criterion_main!(benches);
