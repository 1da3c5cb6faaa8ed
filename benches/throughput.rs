use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mpq_rs::{BoundedMpmcQueue, MessagePassingQueue, UnboundedBaseLinkedQueue};
use std::sync::Arc;
use std::thread;

const MSG_PER_PRODUCER: u64 = 2_000_000;
const BATCH_SIZE: usize = 256;

fn bench_bounded_spsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_spsc");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER));

    group.bench_function("offer_poll_single_elements", |b| {
        b.iter(|| {
            let queue = Arc::new(BoundedMpmcQueue::<u64>::new(4096).unwrap());

            let producer_queue = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                for i in 0..MSG_PER_PRODUCER {
                    while !producer_queue.offer(i) {
                        std::hint::spin_loop();
                    }
                }
            });

            let mut received = 0u64;
            while received < MSG_PER_PRODUCER {
                if let Some(v) = queue.poll() {
                    black_box(v);
                    received += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
            producer.join().unwrap();
        });
    });

    group.bench_function("fill_drain_batched", |b| {
        b.iter(|| {
            let queue = Arc::new(BoundedMpmcQueue::<u64>::new(4096).unwrap());

            let producer_queue = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                let mut sent = 0u64;
                let mut next = 0u64;
                while sent < MSG_PER_PRODUCER {
                    let want = BATCH_SIZE.min((MSG_PER_PRODUCER - sent) as usize);
                    let filled = producer_queue.fill(
                        || {
                            next += 1;
                            next
                        },
                        want,
                    );
                    sent += filled as u64;
                    if filled == 0 {
                        std::hint::spin_loop();
                    }
                }
            });

            let mut received = 0u64;
            while received < MSG_PER_PRODUCER {
                let drained = queue.drain_batched(|v| {
                    black_box(v);
                }, BATCH_SIZE);
                received += drained as u64;
                if drained == 0 {
                    std::hint::spin_loop();
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_bounded_mpmc(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_mpmc");

    for producers in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(MSG_PER_PRODUCER));
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            &producers,
            |b, &producers| {
                b.iter(|| {
                    let queue = Arc::new(BoundedMpmcQueue::<u64>::new(4096).unwrap());
                    let per_producer = MSG_PER_PRODUCER / producers as u64;

                    let handles: Vec<_> = (0..producers)
                        .map(|_| {
                            let queue = Arc::clone(&queue);
                            thread::spawn(move || {
                                for i in 0..per_producer {
                                    while !queue.offer(i) {
                                        std::hint::spin_loop();
                                    }
                                }
                            })
                        })
                        .collect();

                    let mut received = 0u64;
                    let total = per_producer * producers as u64;
                    while received < total {
                        if let Some(v) = queue.poll() {
                            black_box(v);
                            received += 1;
                        } else {
                            std::hint::spin_loop();
                        }
                    }
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_linked_mpsc(c: &mut Criterion) {
    let mut group = c.benchmark_group("linked_mpsc");
    group.throughput(Throughput::Elements(MSG_PER_PRODUCER));

    group.bench_function("single_producer_consumer", |b| {
        b.iter(|| {
            let queue = Arc::new(UnboundedBaseLinkedQueue::<u64>::new());

            let producer_queue = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                for i in 0..MSG_PER_PRODUCER {
                    producer_queue.offer(i);
                }
            });

            let mut received = 0u64;
            while received < MSG_PER_PRODUCER {
                if let Some(v) = queue.poll() {
                    black_box(v);
                    received += 1;
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_bounded_spsc,
    bench_bounded_mpmc,
    bench_linked_mpsc
);
criterion_main!(benches);
