//! Lock/unlock cost of the priority-inheritance mutexes against
//! `parking_lot`.

use criterion::{Criterion, criterion_group, criterion_main};
use parking_lot::lock_api::RawMutex as _;
use pithread::{PiMutex, RawLock, RawPiMutex, RawRecursivePiMutex, RecursivePiMutex, UniqueLock};

fn lock_unlock<L: RawLock>(lock: &L) {
    lock.lock();
    // SAFETY: locked on the line above by this thread.
    unsafe { lock.unlock() };
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended_lock_unlock");

    let pi = RawPiMutex::new();
    group.bench_function("pi_mutex", |b| b.iter(|| lock_unlock(&pi)));

    let recursive = RawRecursivePiMutex::new();
    group.bench_function("recursive_pi_mutex", |b| b.iter(|| lock_unlock(&recursive)));

    let plain = parking_lot::RawMutex::INIT;
    group.bench_function("parking_lot", |b| b.iter(|| lock_unlock(&plain)));

    group.finish();
}

fn bench_guards(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded_update");

    let counter = PiMutex::new(0u64);
    group.bench_function("pi_mutex_guard", |b| {
        b.iter(|| *counter.lock() += 1);
    });

    let nested = RecursivePiMutex::new(std::cell::Cell::new(0u64));
    group.bench_function("recursive_depth_4", |b| {
        b.iter(|| {
            let g1 = nested.lock();
            let g2 = nested.lock();
            let g3 = nested.lock();
            let g4 = nested.lock();
            g4.set(g4.get() + 1);
            criterion::black_box((g1, g2, g3, g4));
        });
    });

    let raw = RawPiMutex::new();
    group.bench_function("unique_lock_relock", |b| {
        b.iter(|| {
            let mut lock = UniqueLock::new(&raw);
            lock.unlock().unwrap();
            lock.relock().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_guards);
criterion_main!(benches);
