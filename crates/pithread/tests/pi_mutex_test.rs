use std::cell::Cell;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};

use pithread::{
    PiMutex, RawLock, RawPiMutex, RawRecursivePiMutex, RecursivePiMutex, Thread, UniqueLock,
};
use pithread_core::mutex_contract::{
    MutexContractOp, MutexContractState, MutexKind, mutex_contract_transition,
};

#[test]
fn pi_mutex_serializes_increments_across_threads() {
    const THREADS: usize = 8;
    const ITERS: usize = 2_000;
    let counter = Arc::new(PiMutex::new(0usize));
    let start = Arc::new(Barrier::new(THREADS));
    let mut threads: Vec<Thread> = (0..THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            let start = Arc::clone(&start);
            Thread::spawn(move || {
                start.wait();
                for _ in 0..ITERS {
                    let mut guard = counter.lock();
                    let seen = *guard;
                    std::hint::spin_loop();
                    *guard = seen + 1;
                }
            })
            .unwrap()
        })
        .collect();
    for t in &mut threads {
        t.join().unwrap();
    }
    assert_eq!(*counter.lock(), THREADS * ITERS);
}

#[test]
fn pi_trylock_fails_while_another_thread_holds() {
    let m = Arc::new(PiMutex::new(()));
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holder = Arc::clone(&m);
    let mut t = Thread::spawn(move || {
        let _guard = holder.lock();
        locked_tx.send(()).unwrap();
        release_rx.recv().unwrap();
    })
    .unwrap();
    locked_rx.recv().unwrap();
    assert!(m.try_lock().is_none());
    release_tx.send(()).unwrap();
    t.join().unwrap();
    assert!(m.try_lock().is_some());
}

/// Run `attempt` on a fresh thread while this one keeps holding its lock.
fn attempt_elsewhere(attempt: impl FnOnce() -> bool + Send) -> bool {
    std::thread::scope(|s| s.spawn(attempt).join().unwrap())
}

#[test]
fn recursive_trylock_fails_while_another_thread_holds() {
    let m = RecursivePiMutex::new(Cell::new(0u32));
    let guard = m.lock();
    let nested = m.lock();
    let raw = m.raw();
    assert!(!attempt_elsewhere(|| raw.try_lock()));
    drop(nested);
    assert!(!attempt_elsewhere(|| raw.try_lock()));
    guard.set(1);
    drop(guard);
    assert!(attempt_elsewhere(|| {
        let got = raw.try_lock();
        if got {
            // SAFETY: taken just above on this thread.
            unsafe { raw.unlock() };
        }
        got
    }));
}

#[test]
fn recursive_guard_try_lock_fails_across_threads() {
    let m = RecursivePiMutex::new(5u32);
    let guard = m.lock();
    assert!(attempt_elsewhere(|| m.try_lock().is_none()));
    assert_eq!(*guard, 5);
    drop(guard);
    assert!(attempt_elsewhere(|| m.try_lock().is_some()));
}

#[test]
fn unique_try_new_fails_while_another_thread_holds() {
    let raw = RawPiMutex::new();
    let held = UniqueLock::new(&raw);
    assert!(attempt_elsewhere(|| UniqueLock::try_new(&raw).is_none()));
    assert!(held.owns_lock());
    drop(held);
    assert!(attempt_elsewhere(|| UniqueLock::try_new(&raw).is_some()));
}

#[test]
fn recursive_mutex_needs_matching_unlocks() {
    const DEPTH: usize = 5;
    let m = Arc::new(RawRecursivePiMutex::new());
    for _ in 0..DEPTH {
        m.lock();
    }
    let probe = |m: &Arc<RawRecursivePiMutex>| {
        let m = Arc::clone(m);
        std::thread::spawn(move || {
            let got = m.try_lock();
            if got {
                // SAFETY: taken just above on this thread.
                unsafe { m.unlock() };
            }
            got
        })
        .join()
        .unwrap()
    };
    for _ in 0..DEPTH - 1 {
        // SAFETY: this thread holds at least two levels here.
        unsafe { m.unlock() };
        assert!(!probe(&m));
    }
    // SAFETY: last level held by this thread.
    unsafe { m.unlock() };
    assert!(probe(&m));
}

#[test]
fn recursive_guard_reenters_on_same_thread() {
    let m = RecursivePiMutex::new(Cell::new(0u32));
    fn bump(m: &RecursivePiMutex<Cell<u32>>, depth: u32) {
        let guard = m.lock();
        guard.set(guard.get() + 1);
        if depth > 0 {
            bump(m, depth - 1);
        }
    }
    bump(&m, 9);
    assert_eq!(m.lock().get(), 10);
}

#[test]
fn unique_lock_over_recursive_raw_mutex() {
    let raw = RawRecursivePiMutex::new();
    let mut outer = UniqueLock::new(&raw);
    {
        let inner = UniqueLock::try_new(&raw).expect("owner may relock");
        assert!(inner.owns_lock());
    }
    outer.unlock().unwrap();
    assert!(!outer.owns_lock());
    outer.relock().unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn priority_inheritance_is_reported() {
    assert!(PiMutex::new(0).is_priority_inheriting());
    assert!(RecursivePiMutex::new(0).is_priority_inheriting());
}

// ---------------------------------------------------------------------------
// Model-based: the real mutexes against the contract state machine.
// ---------------------------------------------------------------------------

/// Deterministic operation stream (xorshift).
struct OpStream(u64);

impl OpStream {
    fn next_op(&mut self) -> MutexContractOp {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        match self.0 % 3 {
            0 => MutexContractOp::Lock,
            1 => MutexContractOp::TryLock,
            _ => MutexContractOp::Unlock,
        }
    }
}

/// True when a thread other than the caller could take `lock` right now.
fn free_for_others<L: RawLock + Sync>(lock: &L) -> bool {
    std::thread::scope(|s| {
        s.spawn(|| {
            let got = lock.try_lock();
            if got {
                // SAFETY: taken just above on this thread.
                unsafe { lock.unlock() };
            }
            got
        })
        .join()
        .unwrap()
    })
}

fn drive_against_contract<L: RawLock + Sync>(kind: MutexKind, lock: &L, seed: u64) {
    let mut ops = OpStream(seed);
    let mut state = MutexContractState::Unlocked;
    for step in 0..400 {
        let op = ops.next_op();
        let outcome = mutex_contract_transition(kind, state, op);
        if outcome.blocks || outcome.is_misuse() {
            continue;
        }
        match op {
            MutexContractOp::Lock => lock.lock(),
            MutexContractOp::TryLock => {
                let got = lock.try_lock();
                assert_eq!(got, outcome.succeeded(), "step {step}: {op:?} in {state:?}");
            }
            // SAFETY: the contract only admits Unlock while held by this thread.
            MutexContractOp::Unlock => unsafe { lock.unlock() },
        }
        state = outcome.next;
        assert_eq!(
            free_for_others(lock),
            state == MutexContractState::Unlocked,
            "step {step}: after {op:?} expected {state:?}"
        );
    }
    while let MutexContractState::LockedBySelf { depth } = state {
        // SAFETY: held by this thread per the model.
        unsafe { lock.unlock() };
        state = if depth > 1 {
            MutexContractState::LockedBySelf { depth: depth - 1 }
        } else {
            MutexContractState::Unlocked
        };
    }
    assert!(free_for_others(lock));
}

#[test]
fn pi_mutex_matches_contract() {
    for seed in [0x9E37_79B9_7F4A_7C15, 7, 0xDEAD_BEEF] {
        drive_against_contract(MutexKind::PriorityInherit, &RawPiMutex::new(), seed);
    }
}

#[test]
fn recursive_pi_mutex_matches_contract() {
    for seed in [0x9E37_79B9_7F4A_7C15, 7, 0xDEAD_BEEF] {
        drive_against_contract(
            MutexKind::RecursivePriorityInherit,
            &RawRecursivePiMutex::new(),
            seed,
        );
    }
}

#[test]
fn contended_trylock_matches_contract() {
    let lock = Arc::new(RawPiMutex::new());
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holder = Arc::clone(&lock);
    let t = std::thread::spawn(move || {
        holder.lock();
        locked_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        // SAFETY: locked above on this thread.
        unsafe { holder.unlock() };
    });
    locked_rx.recv().unwrap();
    let outcome = mutex_contract_transition(
        MutexKind::PriorityInherit,
        MutexContractState::LockedByOther,
        MutexContractOp::TryLock,
    );
    assert_eq!(lock.try_lock(), outcome.succeeded());
    release_tx.send(()).unwrap();
    t.join().unwrap();
}
