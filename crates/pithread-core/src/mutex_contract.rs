//! Observable contract of the priority-inheritance mutexes.
//!
//! A deterministic state machine describing what `lock`, `try_lock` and
//! `unlock` do from the point of view of one thread. Tests drive the real
//! mutexes and this model side by side and compare outcomes.

/// Mutex flavor the contract is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexKind {
    /// Non-recursive: relocking by the owner never succeeds.
    PriorityInherit,
    /// The owner may relock; each lock needs a matching unlock.
    RecursivePriorityInherit,
}

/// Mutex state as seen by the observing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexContractState {
    Unlocked,
    /// Held by the observing thread, `depth` times (always 1 when
    /// non-recursive).
    LockedBySelf { depth: u32 },
    LockedByOther,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexContractOp {
    Lock,
    TryLock,
    Unlock,
}

/// Deterministic transition result for a contract operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexContractOutcome {
    /// Next abstract state after applying the operation.
    pub next: MutexContractState,
    /// errno-style result, 0 on success.
    pub errno: i32,
    /// The caller would wait for another thread to release the mutex.
    pub blocks: bool,
}

impl MutexContractOutcome {
    const fn ok(next: MutexContractState) -> Self {
        Self {
            next,
            errno: 0,
            blocks: false,
        }
    }

    const fn err(next: MutexContractState, errno: i32) -> Self {
        Self {
            next,
            errno,
            blocks: false,
        }
    }

    const fn blocked(next: MutexContractState) -> Self {
        Self {
            next,
            errno: 0,
            blocks: true,
        }
    }

    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.errno == 0 && !self.blocks
    }

    /// The operation is a usage error the library treats as fatal
    /// (unlocking a mutex the caller does not hold, relocking a
    /// non-recursive mutex).
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        self.errno == libc::EPERM || self.errno == libc::EDEADLK
    }
}

/// Apply `op` to a mutex of `kind` in `state`.
#[must_use]
pub const fn mutex_contract_transition(
    kind: MutexKind,
    state: MutexContractState,
    op: MutexContractOp,
) -> MutexContractOutcome {
    use MutexContractState::{LockedByOther, LockedBySelf, Unlocked};

    match state {
        Unlocked => match op {
            MutexContractOp::Lock | MutexContractOp::TryLock => {
                MutexContractOutcome::ok(LockedBySelf { depth: 1 })
            }
            MutexContractOp::Unlock => MutexContractOutcome::err(Unlocked, libc::EPERM),
        },
        LockedByOther => match op {
            MutexContractOp::Lock => MutexContractOutcome::blocked(LockedByOther),
            MutexContractOp::TryLock => MutexContractOutcome::err(LockedByOther, libc::EBUSY),
            MutexContractOp::Unlock => MutexContractOutcome::err(LockedByOther, libc::EPERM),
        },
        LockedBySelf { depth } => match op {
            MutexContractOp::Unlock => {
                if depth <= 1 {
                    MutexContractOutcome::ok(Unlocked)
                } else {
                    MutexContractOutcome::ok(LockedBySelf { depth: depth - 1 })
                }
            }
            MutexContractOp::Lock | MutexContractOp::TryLock => match kind {
                MutexKind::RecursivePriorityInherit => match depth.checked_add(1) {
                    Some(depth) => MutexContractOutcome::ok(LockedBySelf { depth }),
                    None => MutexContractOutcome::err(state, libc::EAGAIN),
                },
                MutexKind::PriorityInherit => {
                    if matches!(op, MutexContractOp::TryLock) {
                        MutexContractOutcome::err(state, libc::EBUSY)
                    } else {
                        MutexContractOutcome::err(state, libc::EDEADLK)
                    }
                }
            },
        },
    }
}

/// Fold a sequence of operations from `Unlocked`, stopping at the first
/// outcome that blocks or is a misuse. Returns every outcome produced.
#[must_use]
pub fn replay(kind: MutexKind, ops: &[MutexContractOp]) -> Vec<MutexContractOutcome> {
    let mut state = MutexContractState::Unlocked;
    let mut out = Vec::with_capacity(ops.len());
    for &op in ops {
        let outcome = mutex_contract_transition(kind, state, op);
        out.push(outcome);
        if outcome.blocks || outcome.is_misuse() {
            break;
        }
        state = outcome.next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use MutexContractOp::{Lock, TryLock, Unlock};
    use MutexContractState::{LockedByOther, LockedBySelf, Unlocked};

    #[test]
    fn lock_unlock_cycle() {
        for kind in [MutexKind::PriorityInherit, MutexKind::RecursivePriorityInherit] {
            let locked = mutex_contract_transition(kind, Unlocked, Lock);
            assert!(locked.succeeded());
            assert_eq!(locked.next, LockedBySelf { depth: 1 });
            let unlocked = mutex_contract_transition(kind, locked.next, Unlock);
            assert!(unlocked.succeeded());
            assert_eq!(unlocked.next, Unlocked);
        }
    }

    #[test]
    fn contended_trylock_is_busy_and_lock_blocks() {
        let kind = MutexKind::PriorityInherit;
        let busy = mutex_contract_transition(kind, LockedByOther, TryLock);
        assert_eq!(busy.errno, libc::EBUSY);
        assert!(!busy.is_misuse());
        assert!(mutex_contract_transition(kind, LockedByOther, Lock).blocks);
    }

    #[test]
    fn recursive_depth_tracks_locks() {
        let kind = MutexKind::RecursivePriorityInherit;
        let outcomes = replay(kind, &[Lock, TryLock, Lock, Unlock, Unlock, Unlock]);
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(MutexContractOutcome::succeeded));
        assert_eq!(outcomes[2].next, LockedBySelf { depth: 3 });
        assert_eq!(outcomes[5].next, Unlocked);
    }

    #[test]
    fn non_recursive_relock_is_misuse_but_trylock_is_busy() {
        let kind = MutexKind::PriorityInherit;
        let held = LockedBySelf { depth: 1 };
        assert_eq!(mutex_contract_transition(kind, held, TryLock).errno, libc::EBUSY);
        let relock = mutex_contract_transition(kind, held, Lock);
        assert_eq!(relock.errno, libc::EDEADLK);
        assert!(relock.is_misuse());
    }

    #[test]
    fn unlock_without_ownership_is_misuse() {
        for kind in [MutexKind::PriorityInherit, MutexKind::RecursivePriorityInherit] {
            assert!(mutex_contract_transition(kind, Unlocked, Unlock).is_misuse());
            assert!(mutex_contract_transition(kind, LockedByOther, Unlock).is_misuse());
        }
    }

    #[test]
    fn replay_stops_at_misuse() {
        let outcomes = replay(MutexKind::PriorityInherit, &[Lock, Unlock, Unlock, Lock]);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[2].errno, libc::EPERM);
    }

    #[test]
    fn recursive_depth_saturation_reports_eagain() {
        let outcome = mutex_contract_transition(
            MutexKind::RecursivePriorityInherit,
            LockedBySelf { depth: u32::MAX },
            Lock,
        );
        assert_eq!(outcome.errno, libc::EAGAIN);
        assert_eq!(outcome.next, LockedBySelf { depth: u32::MAX });
    }
}
