/*
 * Priority Round-Robin Policy
 *
 * Fixed priorities with strict round-robin inside a priority level.
 *
 * Decision per kernel pass:
 * 1. Classify every registered thread: READY/RUNNING threads get their
 *    priority recorded, everything else is marked suspended/blocked.
 * 2. Count the runnable population per priority level.
 * 3. Nothing runnable -> no decision; the kernel idles on its own stack.
 * 4. The lowest numeric value with population wins (0 is highest).
 * 5. Collect the run list of that level, ordered by table index.
 * 6. One candidate -> take it. Otherwise continue after the currently
 *    RUNNING thread (its cyclic successor), so a thread that yields is
 *    not simply re-picked while peers at its level are waiting. No
 *    RUNNING thread in the list -> take the first candidate.
 *
 * The policy also accumulates per-thread CPU statistics: microseconds
 * consumed per slice, folded once a second into a milliseconds-per-
 * second table plus the idle/threads/system split.
 */

use super::SchedulingPolicy;
use crate::config::{MAX_THR_CNT, PRIORITY_CNT};
use crate::scheduler::thread::{Thread, ThreadState};

/// Marker in the priority list for a thread that cannot run.
const SUSPEND_BLOCKED_ID: u8 = 250;

/// Marker for an absent table slot.
const EMPTY_ID: u8 = 255;

/// Per-second CPU accounting derived from slice measurements.
#[derive(Debug, Clone, Copy)]
pub struct SchedDbg {
    /// Active milliseconds of each thread during the last full second.
    pub thr_active_per_1s: [u32; MAX_THR_CNT],
    /// Idle-thread milliseconds during the last second.
    pub idle_time_ms_per_1s: u32,
    /// Milliseconds spent in all non-idle threads.
    pub all_thr_time_ms_per_1s: u32,
    /// What remains of the second: kernel passes and switching.
    pub sys_time_ms_per_1s: u32,
}

impl SchedDbg {
    fn new() -> Self {
        SchedDbg {
            thr_active_per_1s: [0; MAX_THR_CNT],
            idle_time_ms_per_1s: 0,
            all_thr_time_ms_per_1s: 0,
            sys_time_ms_per_1s: 0,
        }
    }
}

pub struct RoundRobin {
    /// Priority of each runnable thread, or SUSPEND_BLOCKED_ID/EMPTY_ID.
    thr_plist: [u8; MAX_THR_CNT],
    /// Indices of the threads competing at the winning priority.
    run_list: [u8; MAX_THR_CNT],
    /// Runnable population per priority level.
    priority_list: [u8; PRIORITY_CNT],
    ready_thr_cnt: u8,
    run_list_cnt: u8,

    /// Microseconds accumulated per thread since the last fold.
    curr_dt_us: [u32; MAX_THR_CNT],
    stat_ts: u32,
    pub dbg: SchedDbg,
}

impl RoundRobin {
    pub fn new() -> Self {
        RoundRobin {
            thr_plist: [EMPTY_ID; MAX_THR_CNT],
            run_list: [EMPTY_ID; MAX_THR_CNT],
            priority_list: [0; PRIORITY_CNT],
            ready_thr_cnt: 0,
            run_list_cnt: 0,
            curr_dt_us: [0; MAX_THR_CNT],
            stat_ts: 0,
            dbg: SchedDbg::new(),
        }
    }

    /// Charge the current thread for its last slice and fold the
    /// per-second statistics once 1000 ms have passed.
    pub fn account(&mut self, max_ind: u8, current: u8, thr_dt_us: u32, now_ms: u32) {
        const PERIOD_MS: u32 = 1000;

        if max_ind as usize >= MAX_THR_CNT || current as usize >= MAX_THR_CNT {
            return;
        }
        self.curr_dt_us[current as usize] += thr_dt_us;

        if now_ms.wrapping_sub(self.stat_ts) < PERIOD_MS {
            return;
        }
        self.stat_ts = now_ms;

        let mut all_ms = 0;
        for i in 0..=max_ind as usize {
            self.dbg.thr_active_per_1s[i] = self.curr_dt_us[i] / 1000;
            self.curr_dt_us[i] = 0;
            all_ms += self.dbg.thr_active_per_1s[i];
        }

        // Thread 0 is the idle thread the kernel provisions at init.
        self.dbg.idle_time_ms_per_1s = self.dbg.thr_active_per_1s[0];
        self.dbg.all_thr_time_ms_per_1s = all_ms - self.dbg.idle_time_ms_per_1s;
        self.dbg.sys_time_ms_per_1s = PERIOD_MS.saturating_sub(all_ms);
    }
}

impl SchedulingPolicy for RoundRobin {
    fn pick_next(&mut self, threads: &[Option<Thread>], max_ind: u8) -> Option<u8> {
        if max_ind as usize >= MAX_THR_CNT {
            return None;
        }

        self.thr_plist = [EMPTY_ID; MAX_THR_CNT];
        self.run_list = [EMPTY_ID; MAX_THR_CNT];
        self.priority_list = [0; PRIORITY_CNT];
        self.ready_thr_cnt = 0;
        self.run_list_cnt = 0;

        // Classify the table.
        for i in 0..=max_ind as usize {
            let Some(thr) = threads[i].as_ref() else {
                continue;
            };
            let pr = (thr.priority as usize).min(PRIORITY_CNT - 1);
            match thr.var.state {
                ThreadState::Ready | ThreadState::Running => {
                    self.thr_plist[i] = pr as u8;
                    self.priority_list[pr] += 1;
                    self.ready_thr_cnt += 1;
                }
                _ => self.thr_plist[i] = SUSPEND_BLOCKED_ID,
            }
        }

        if self.ready_thr_cnt == 0 {
            return None;
        }

        // Highest populated priority (lowest numeric value).
        let mut target_pr = 0u8;
        for pr in 0..PRIORITY_CNT {
            if self.priority_list[pr] != 0 {
                target_pr = pr as u8;
                break;
            }
        }

        // Run list of that level, in table order; note the running one.
        let mut running: Option<u8> = None;
        let mut ind = 0usize;
        for i in 0..=max_ind as usize {
            if self.thr_plist[i] != target_pr {
                continue;
            }
            self.run_list[ind] = i as u8;
            ind += 1;
            if let Some(thr) = threads[i].as_ref() {
                if thr.var.state == ThreadState::Running {
                    running = Some(i as u8);
                }
            }
        }
        self.run_list_cnt = ind as u8;

        if self.run_list_cnt == 1 {
            return Some(self.run_list[0]);
        }

        let Some(active) = running else {
            // More than one candidate, none currently running.
            return Some(self.run_list[0]);
        };

        // Cyclic successor of the running thread.
        let mut pos = 0usize;
        for (i, &id) in self.run_list[..ind].iter().enumerate() {
            if id == active {
                pos = i;
                break;
            }
        }
        pos += 1;
        if pos >= ind {
            pos = 0;
        }
        Some(self.run_list[pos])
    }
}
