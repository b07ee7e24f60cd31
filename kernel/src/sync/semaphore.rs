/*
 * Binary and Counting Semaphores
 *
 * Both semaphores share the blocker (FIFO waiter ring) and the timeout
 * block. A semaphore with a configured timeout auto-releases the head of
 * its waiter queue after `timeout_ms` of continuous blocking; the wake is
 * tagged so a subsequent `take_stat` reports FAIL instead of OK.
 *
 * Take and give return outcome values instead of reaching into the
 * thread table; the kernel core blocks or wakes the named thread.
 *
 * Timeout status is a single flag per semaphore, written by the most
 * recent give. When several waiters time out back to back only the
 * latest one reliably reads its own status; the window is inherent to
 * the single-flag design.
 */

use crate::sync::blocker::Blocker;
use crate::types::{FosError, INF_TIME, ThrId, UserDesc};

/// Binary semaphore state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SembState {
    Locked,
    Unlocked,
}

/// Outcome of a take: either the caller owns the semaphore now, or it
/// has been queued and must be blocked by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    Acquired,
    MustBlock,
}

/// Shared timeout machinery.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockTimeout {
    /// Set when the most recent wake was a timeout release.
    pub flag: bool,
    /// 0 disables the timeout.
    pub timeout_ms: u32,
    /// Absolute deadline of the next auto-release.
    pub deadline_ms: u32,
}

impl LockTimeout {
    /// Configure the timeout; 0 and INF_TIME both disable it. The first
    /// deadline counts from the moment of configuration, later ones
    /// from each give or sweep.
    pub fn configure(&mut self, timeout_ms: u32, now_ms: u32) {
        self.timeout_ms = if timeout_ms == INF_TIME { 0 } else { timeout_ms };
        self.deadline_ms = now_ms.wrapping_add(self.timeout_ms);
    }

    fn rearm(&mut self, now_ms: u32) {
        self.flag = false;
        self.deadline_ms = now_ms.wrapping_add(self.timeout_ms);
    }
}

#[derive(Debug, Clone)]
pub struct SemBinary {
    state: SembState,
    pub timeout: LockTimeout,
    pub blocker: Blocker,
    pub user_desc: UserDesc,
    /// Kernel-arena allocation backing this object, 0 when static.
    pub(crate) kmem: u32,
}

impl SemBinary {
    pub fn new(init_state: SembState) -> Self {
        SemBinary {
            state: init_state,
            timeout: LockTimeout::default(),
            blocker: Blocker::new(),
            user_desc: crate::types::WRONG_USER_DESC,
            kmem: 0,
        }
    }

    pub fn state(&self) -> SembState {
        self.state
    }

    /// Take: an unlocked semaphore locks, a locked one queues the caller.
    pub fn take(&mut self, thr_id: ThrId) -> Result<TakeOutcome, FosError> {
        match self.state {
            SembState::Unlocked => {
                self.state = SembState::Locked;
                Ok(TakeOutcome::Acquired)
            }
            SembState::Locked => {
                self.blocker.take(thr_id)?;
                Ok(TakeOutcome::MustBlock)
            }
        }
    }

    /// OK unless the most recent wake on this semaphore was a timeout.
    pub fn take_stat(&self) -> Result<(), FosError> {
        if self.timeout.flag {
            return Err(FosError::Timeout);
        }
        Ok(())
    }

    /// Give: wakes the FIFO head while waiters exist, unlocks otherwise.
    /// Returns the thread the kernel must make ready.
    pub fn give(&mut self, now_ms: u32) -> Option<ThrId> {
        let woken = match self.state {
            SembState::Unlocked => None,
            SembState::Locked => match self.blocker.give(false) {
                Some(thr) => Some(thr),
                None => {
                    self.state = SembState::Unlocked;
                    None
                }
            },
        };
        self.timeout.rearm(now_ms);
        woken
    }

    /// Timeout sweep, run once per kernel pass.
    pub fn sweep(&mut self, now_ms: u32) -> Option<ThrId> {
        sweep(&mut self.timeout, &mut self.blocker, now_ms)
    }

    pub fn unlink(&mut self, thr_id: ThrId) -> bool {
        self.blocker.unlink(thr_id)
    }

    /// Wake every waiter (object deletion, thread reaping).
    pub fn unlock_all(&mut self, mut wake: impl FnMut(ThrId)) {
        while let Some(thr) = self.blocker.give(false) {
            wake(thr);
        }
    }
}

#[derive(Debug, Clone)]
pub struct SemCounting {
    pub max_cnt: u32,
    cnt: u32,
    pub timeout: LockTimeout,
    pub blocker: Blocker,
    pub user_desc: UserDesc,
    pub(crate) kmem: u32,
}

impl SemCounting {
    pub fn new(max_cnt: u32, init_cnt: u32) -> Self {
        SemCounting {
            max_cnt,
            cnt: init_cnt.min(max_cnt),
            timeout: LockTimeout::default(),
            blocker: Blocker::new(),
            user_desc: crate::types::WRONG_USER_DESC,
            kmem: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.cnt
    }

    /// Take one unit. With `waiter = None` (poll) an empty semaphore
    /// still reports Acquired: the caller accepts the empty outcome and
    /// checks the data source itself.
    pub fn take(&mut self, waiter: Option<ThrId>) -> Result<TakeOutcome, FosError> {
        if self.cnt > 0 {
            self.cnt -= 1;
            return Ok(TakeOutcome::Acquired);
        }
        match waiter {
            Some(thr_id) => {
                self.blocker.take(thr_id)?;
                Ok(TakeOutcome::MustBlock)
            }
            None => Ok(TakeOutcome::Acquired),
        }
    }

    pub fn take_stat(&self) -> Result<(), FosError> {
        if self.timeout.flag {
            return Err(FosError::Timeout);
        }
        Ok(())
    }

    /// Give one unit, saturating at `max_cnt`. A unit given while
    /// waiters queue hands the unit straight to the FIFO head.
    pub fn give(&mut self, now_ms: u32) -> Option<ThrId> {
        let woken = if self.cnt > 0 {
            self.cnt += 1;
            None
        } else {
            match self.blocker.give(false) {
                Some(thr) => Some(thr),
                None => {
                    self.cnt = 1;
                    None
                }
            }
        };
        if self.cnt > self.max_cnt {
            self.cnt = self.max_cnt;
        }
        self.timeout.rearm(now_ms);
        woken
    }

    pub fn sweep(&mut self, now_ms: u32) -> Option<ThrId> {
        sweep(&mut self.timeout, &mut self.blocker, now_ms)
    }

    pub fn unlink(&mut self, thr_id: ThrId) -> bool {
        self.blocker.unlink(thr_id)
    }

    pub fn unlock_all(&mut self, mut wake: impl FnMut(ThrId)) {
        while let Some(thr) = self.blocker.give(false) {
            wake(thr);
        }
    }
}

/// Common timeout sweep: while waiters exist and the deadline has
/// passed, release the head with the timeout tag and advance the
/// deadline. Without waiters the deadline just tracks `now`.
fn sweep(timeout: &mut LockTimeout, blocker: &mut Blocker, now_ms: u32) -> Option<ThrId> {
    if timeout.timeout_ms == 0 {
        return None;
    }

    if blocker.is_empty() {
        timeout.deadline_ms = now_ms.wrapping_add(timeout.timeout_ms);
        return None;
    }

    if now_ms >= timeout.deadline_ms {
        timeout.deadline_ms = now_ms.wrapping_add(timeout.timeout_ms);
        timeout.flag = true;
        return blocker.give(true);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_take_give_cycle() {
        let mut s = SemBinary::new(SembState::Unlocked);
        assert_eq!(s.take(0), Ok(TakeOutcome::Acquired));
        assert_eq!(s.state(), SembState::Locked);
        assert_eq!(s.take(1), Ok(TakeOutcome::MustBlock));
        assert_eq!(s.take(2), Ok(TakeOutcome::MustBlock));

        // FIFO wake while waiters remain; state stays locked.
        assert_eq!(s.give(0), Some(1));
        assert_eq!(s.give(0), Some(2));
        assert_eq!(s.state(), SembState::Locked);
        assert_eq!(s.give(0), None);
        assert_eq!(s.state(), SembState::Unlocked);
    }

    #[test]
    fn test_binary_give_unlocked_is_noop() {
        let mut s = SemBinary::new(SembState::Unlocked);
        assert_eq!(s.give(0), None);
        assert_eq!(s.state(), SembState::Unlocked);
    }

    #[test]
    fn test_binary_timeout_sweep_marks_stat() {
        let mut s = SemBinary::new(SembState::Locked);
        s.timeout.configure(50, 100);
        assert_eq!(s.take(3), Ok(TakeOutcome::MustBlock));

        assert_eq!(s.sweep(120), None);
        assert_eq!(s.sweep(150), Some(3));
        assert_eq!(s.take_stat(), Err(FosError::Timeout));
        assert_eq!(s.blocker.timeout_cnt, 1);

        // A real give clears the stat again.
        s.give(150);
        assert_eq!(s.take_stat(), Ok(()));
    }

    #[test]
    fn test_binary_set_timeout_inf_disables() {
        let mut s = SemBinary::new(SembState::Locked);
        s.timeout.configure(INF_TIME, 0);
        assert_eq!(s.timeout.timeout_ms, 0);
        s.take(1).unwrap();
        assert_eq!(s.sweep(1_000_000), None);
    }

    #[test]
    fn test_counting_decrement_and_block() {
        let mut s = SemCounting::new(2, 2);
        assert_eq!(s.take(Some(0)), Ok(TakeOutcome::Acquired));
        assert_eq!(s.take(Some(0)), Ok(TakeOutcome::Acquired));
        assert_eq!(s.count(), 0);
        assert_eq!(s.take(Some(1)), Ok(TakeOutcome::MustBlock));

        // Poll take on an empty semaphore does not queue.
        assert_eq!(s.take(None), Ok(TakeOutcome::Acquired));
        assert_eq!(s.blocker.len(), 1);
    }

    #[test]
    fn test_counting_give_hands_unit_to_waiter() {
        let mut s = SemCounting::new(4, 0);
        s.take(Some(5)).unwrap();
        assert_eq!(s.give(0), Some(5));
        // The unit went to the waiter, not the counter.
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn test_counting_saturates_at_max() {
        let mut s = SemCounting::new(2, 0);
        for _ in 0..5 {
            assert_eq!(s.give(0), None);
        }
        assert_eq!(s.count(), 2);

        // give-then-take round trip restores the counter.
        s.take(Some(0)).unwrap();
        assert_eq!(s.count(), 1);
        s.give(0);
        assert_eq!(s.count(), 2);
    }

    #[test]
    fn test_counting_init_clamped() {
        let s = SemCounting::new(3, 10);
        assert_eq!(s.count(), 3);
    }

    #[test]
    fn test_counting_timeout_rearm_without_waiters() {
        let mut s = SemCounting::new(1, 0);
        s.timeout.configure(100, 900);
        // No waiters: the sweep only tracks the deadline forward.
        assert_eq!(s.sweep(1000), None);
        s.take(Some(2)).unwrap();
        assert_eq!(s.sweep(1050), None);
        assert_eq!(s.sweep(1100), Some(2));
        assert_eq!(s.take_stat(), Err(FosError::Timeout));
    }

    #[test]
    fn test_unlock_all_wakes_in_fifo_order() {
        let mut s = SemBinary::new(SembState::Locked);
        s.take(1).unwrap();
        s.take(2).unwrap();
        s.take(3).unwrap();
        let mut woken = Vec::new();
        s.unlock_all(|t| woken.push(t));
        assert_eq!(woken, vec![1, 2, 3]);
        assert!(s.blocker.is_empty());
    }
}
