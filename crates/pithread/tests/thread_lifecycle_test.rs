use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use pithread::{CpuSet, SchedPolicy, Thread, ThreadAttribute, ThreadId, this_thread};

#[test]
fn default_thread_is_empty() {
    let t = Thread::default();
    assert!(!t.joinable());
    assert_eq!(t.id(), ThreadId::default());
    assert!(t.native_handle().is_none());
}

#[test]
fn spawned_body_sets_flag_before_join_returns() {
    let flag = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&flag);
    let mut t = Thread::spawn(move || seen.store(true, Ordering::SeqCst)).unwrap();
    assert!(t.joinable());
    t.join().unwrap();
    assert!(flag.load(Ordering::SeqCst));
    assert!(!t.joinable());
}

#[test]
fn id_matches_id_seen_inside_the_thread() {
    let (tx, rx) = mpsc::channel();
    let mut t = Thread::spawn(move || tx.send(this_thread::get_id()).unwrap()).unwrap();
    let inside = rx.recv().unwrap();
    assert_eq!(t.id(), inside);
    assert_ne!(inside, this_thread::get_id());
    t.join().unwrap();
    assert!(t.id().is_none());
}

#[test]
fn take_moves_ownership() {
    let mut a = Thread::spawn(|| {}).unwrap();
    let id = a.id();
    let mut b = a.take();
    assert!(!a.joinable());
    assert!(b.joinable());
    assert_eq!(b.id(), id);
    b.join().unwrap();
}

#[test]
fn swap_exchanges_ownership() {
    let mut a = Thread::spawn(|| {}).unwrap();
    let mut b = Thread::new();
    let id = a.id();
    a.swap(&mut b);
    assert!(!a.joinable());
    assert_eq!(b.id(), id);
    b.join().unwrap();
}

#[test]
fn second_join_and_late_detach_fail_with_einval() {
    let mut t = Thread::spawn(|| {}).unwrap();
    t.join().unwrap();
    assert_eq!(t.join().unwrap_err().errno(), Some(libc::EINVAL));
    assert_eq!(t.detach().unwrap_err().errno(), Some(libc::EINVAL));
}

#[test]
fn detach_releases_ownership_and_thread_keeps_running() {
    let (tx, rx) = mpsc::channel();
    let mut t = Thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        tx.send(()).unwrap();
    })
    .unwrap();
    t.detach().unwrap();
    assert!(!t.joinable());
    rx.recv_timeout(Duration::from_secs(10)).unwrap();
}

#[test]
fn detached_attribute_yields_empty_thread() {
    let (tx, rx) = mpsc::channel();
    let mut attr = ThreadAttribute::new();
    attr.set_run_as_detached(true);
    let t = Thread::spawn_with(&attr, move || tx.send(41 + 1).unwrap()).unwrap();
    assert!(!t.joinable());
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 42);
}

#[test]
fn inherit_attribute_launches_normally() {
    let mut t = Thread::spawn_with(&ThreadAttribute::default(), || {}).unwrap();
    t.join().unwrap();
}

#[test]
fn custom_stack_size_is_usable() {
    let mut attr = ThreadAttribute::new();
    attr.set_stack_size(4 << 20);
    let mut t = Thread::spawn_with(&attr, || {
        let buf = [7u8; 1 << 20];
        assert_eq!(std::hint::black_box(&buf)[(1 << 20) - 1], 7);
    })
    .unwrap();
    t.join().unwrap();
}

#[test]
fn invalid_attribute_never_runs_body() {
    let ran = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&ran);
    let mut attr = ThreadAttribute::default();
    attr.set_stack_size(16);
    let err = Thread::spawn_with(&attr, move || seen.store(true, Ordering::SeqCst)).unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(!ran.load(Ordering::SeqCst));
}

#[cfg(target_os = "linux")]
#[test]
fn unavailable_policy_is_rejected_before_launch() {
    let mut attr = ThreadAttribute::default();
    attr.set_sched_policy(SchedPolicy::Sporadic);
    assert!(Thread::spawn_with(&attr, || {}).unwrap_err().is_invalid_argument());
}

#[test]
fn many_threads_all_join() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut threads: Vec<Thread> = (0..16)
        .map(|_| {
            let counter = Arc::clone(&counter);
            Thread::spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        })
        .collect();
    for t in &mut threads {
        t.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 16);
}

#[test]
fn hardware_concurrency_matches_processor_count() {
    assert_eq!(Thread::hardware_concurrency(), CpuSet::num_processors());
    assert!(Thread::hardware_concurrency() >= 1);
}

#[test]
fn thread_moves_between_owners_across_threads() {
    let t = Thread::spawn(|| {}).unwrap();
    let mut back = std::thread::spawn(move || t).join().unwrap();
    back.join().unwrap();
}
