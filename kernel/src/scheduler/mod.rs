/*
 * Kernel Core
 *
 * This module owns the one kernel instance of the system: every
 * registry, both arenas, the deferred-free list, the work-mode globals
 * and the scheduler. Everything else in the crate is either a pure data
 * structure (sync, ipc, memory) or a thin layer over the operations
 * defined here (syscall gates, user API).
 *
 * Structure:
 * - `Fos` methods are the kernel-side operations. They take explicit
 *   `now_ms` arguments so the state machine is deterministic under test.
 * - The global singleton lives behind a spin mutex; `with_fos` masks
 *   interrupts around the lock so from-ISR entry points cannot deadlock
 *   against a preempted holder on a single core.
 * - The main-loop pass runs in kernel mode on the kernel stack: drain
 *   deferred frees, check arena integrity, reap terminating threads,
 *   probe stacks, sweep semaphore timeouts, wake timed sleepers, then
 *   schedule and hand the CPU back to user mode.
 *
 * Object deletion never frees memory in place. The address goes on the
 * deferred-free list and the memory is returned on a later pass, so a
 * thread that is being torn down cannot lose the stack it still runs on.
 */

pub mod context;
pub mod policies;
pub mod thread;

use core::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use spin::Mutex;

use crate::config::{
    DEF_THR_HEAP_SIZE, FPROC_THR_STACK_SIZE, FWRITER_CNT, IDLE_THR_STACK_SIZE, KERNEL_STACK_SIZE,
    MAX_OBJ_TO_DEL, MAX_THR_CNT, PRIORITY_CNT, QUEUE_32_CNT, SEM_BIN_CNT, SEM_COUNTING_CNT,
};
use crate::fwriter::WriterSlot;
use crate::ipc::queue32::{Blocking, Queue32, QueueMode};
use crate::memory::{ArenaId, DelEntry, KernelHeaps};
use crate::platform;
use crate::sync::semaphore::{SemBinary, SemCounting, SembState, TakeOutcome};
use crate::types::{
    ERROR_KERNEL_HEAP, ERROR_KERNEL_STACK, ERROR_THREADS_HEAP, ERROR_THREADS_STACK, FosError,
    KERNEL_USER_DESC, LatchedError, ThrId, UserDesc, WRONG_USER_DESC,
};

use context::{MainGlobals, WorkMode};
use policies::{RoundRobin, SchedulingPolicy};
use thread::{AllocMode, LockMask, StackDbg, Thread, ThreadCSet, ThreadMode, ThreadUserInit};

/// Set once `start()` ran; cheap to poll from interrupt context.
static OS_ENABLED: AtomicBool = AtomicBool::new(false);

pub struct Fos {
    enabled: bool,
    pub(crate) mgv: MainGlobals,
    current_thr: ThrId,

    threads: [Option<Thread>; MAX_THR_CNT],
    thread_max_ind: u8,
    semb: [Option<SemBinary>; SEM_BIN_CNT],
    semb_max_ind: u8,
    semc: [Option<SemCounting>; SEM_COUNTING_CNT],
    semc_max_ind: u8,
    queues: [Option<Queue32>; QUEUE_32_CNT],
    queue32_max_ind: u8,
    writers: [Option<WriterSlot>; FWRITER_CNT],
    fwriter_max_ind: u8,

    error: LatchedError,
    last_user_desc: UserDesc,
    del_list: heapless::Vec<DelEntry, MAX_OBJ_TO_DEL>,
    pub(crate) heaps: KernelHeaps,

    kernel_stack: [u8; KERNEL_STACK_SIZE],
    sys_stack_dbg: StackDbg,
    sched: RoundRobin,
}

impl Fos {
    pub fn new() -> Self {
        Fos {
            enabled: false,
            mgv: MainGlobals::new(crate::config::DEF_TIM_PERIOD_US),
            current_thr: 0,
            threads: core::array::from_fn(|_| None),
            thread_max_ind: 0,
            semb: core::array::from_fn(|_| None),
            semb_max_ind: 0,
            semc: core::array::from_fn(|_| None),
            semc_max_ind: 0,
            queues: core::array::from_fn(|_| None),
            queue32_max_ind: 0,
            writers: core::array::from_fn(|_| None),
            fwriter_max_ind: 0,
            error: LatchedError::default(),
            last_user_desc: KERNEL_USER_DESC,
            del_list: heapless::Vec::new(),
            heaps: KernelHeaps::new(),
            kernel_stack: [0; KERNEL_STACK_SIZE],
            sys_stack_dbg: StackDbg::new(0, KERNEL_STACK_SIZE as u32),
            sched: RoundRobin::new(),
        }
    }

    /// Reset the kernel and provision the system services: the idle
    /// thread (lowest priority, never blocks) and the file-service
    /// thread. Thread 0 being idle is what guarantees the scheduler
    /// always has a candidate once the OS is enabled.
    pub fn init(&mut self) {
        *self = Fos::new();

        let idle = self
            .create_thread(&ThreadUserInit {
                name: "Idle",
                entry: idle_main,
                stack_size: IDLE_THR_STACK_SIZE,
                heap_size: IDLE_THR_STACK_SIZE,
                priority: (PRIORITY_CNT - 1) as u8,
                alloc: AllocMode::Auto,
            })
            .expect("idle thread must fit a fresh kernel");
        self.run_desc(idle).expect("idle thread launches");

        let fproc = self
            .create_thread(&ThreadUserInit {
                name: "FProc",
                entry: crate::fwriter::fproc_main,
                stack_size: FPROC_THR_STACK_SIZE,
                heap_size: DEF_THR_HEAP_SIZE,
                priority: (PRIORITY_CNT - 2) as u8,
                alloc: AllocMode::Auto,
            })
            .expect("file-service thread must fit a fresh kernel");
        self.run_desc(fproc).expect("file-service thread launches");

        log::info!("kernel initialized, {} priority levels", PRIORITY_CNT);
    }

    /// Enable the OS: load the first thread's stack and open the switch.
    pub fn start(&mut self) -> Result<(), FosError> {
        if self.enabled {
            return Err(FosError::WrongState);
        }
        if let Some(thr) = self.threads[self.current_thr as usize].as_ref() {
            self.mgv.user_sp = thr.var.sp;
        }
        self.enabled = true;
        OS_ENABLED.store(true, Ordering::SeqCst);
        log::info!("kernel started");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_thread(&self) -> ThrId {
        self.current_thr
    }

    /// Descriptor of the thread the CPU is executing, WRONG outside one.
    pub fn current_thread_desc(&self) -> UserDesc {
        match self.threads[self.current_thr as usize].as_ref() {
            Some(t) => t.user_desc,
            None => WRONG_USER_DESC,
        }
    }

    pub fn latched_error(&self) -> &LatchedError {
        &self.error
    }

    pub fn sys_stack_dbg(&self) -> &StackDbg {
        &self.sys_stack_dbg
    }

    pub fn scheduler_dbg(&self) -> &policies::round_robin::SchedDbg {
        &self.sched.dbg
    }

    // ------------------------------------------------------------------
    // Descriptors and lookups
    // ------------------------------------------------------------------

    fn gen_user_desc(&mut self) -> UserDesc {
        self.last_user_desc = self.last_user_desc.wrapping_add(1);
        while self.last_user_desc == WRONG_USER_DESC || self.last_user_desc == KERNEL_USER_DESC {
            self.last_user_desc = self.last_user_desc.wrapping_add(1);
        }
        self.last_user_desc
    }

    /// Parent of a newly created object: the calling thread, or the
    /// kernel itself during boot and kernel-mode passes.
    fn parent_desc(&self) -> UserDesc {
        if self.mgv.mode == WorkMode::Kernel {
            return KERNEL_USER_DESC;
        }
        self.current_thread_desc()
    }

    pub fn thread_id_by_desc(&self, desc: UserDesc) -> Option<ThrId> {
        if desc == WRONG_USER_DESC {
            return None;
        }
        (0..=self.thread_max_ind).find(|&i| {
            self.threads[i as usize]
                .as_ref()
                .is_some_and(|t| t.user_desc == desc)
        })
    }

    fn semb_id_by_desc(&self, desc: UserDesc) -> Option<u8> {
        if desc == WRONG_USER_DESC {
            return None;
        }
        (0..=self.semb_max_ind).find(|&i| {
            self.semb[i as usize]
                .as_ref()
                .is_some_and(|s| s.user_desc == desc)
        })
    }

    fn semc_id_by_desc(&self, desc: UserDesc) -> Option<u8> {
        if desc == WRONG_USER_DESC {
            return None;
        }
        (0..=self.semc_max_ind).find(|&i| {
            self.semc[i as usize]
                .as_ref()
                .is_some_and(|s| s.user_desc == desc)
        })
    }

    fn queue_id_by_desc(&self, desc: UserDesc) -> Option<u8> {
        if desc == WRONG_USER_DESC {
            return None;
        }
        (0..=self.queue32_max_ind).find(|&i| {
            self.queues[i as usize]
                .as_ref()
                .is_some_and(|q| q.user_desc == desc)
        })
    }

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    /// Create a thread: its stack-plus-scratch region comes from the
    /// threads arena, its control-block charge from the kernel arena,
    /// and it gets a private locked binary semaphore for joiners.
    /// Any failure rolls the partial work back.
    pub fn create_thread(&mut self, init: &ThreadUserInit) -> Result<UserDesc, FosError> {
        if init.name.is_empty()
            || init.stack_size < 4 * context::INIT_FRAME_WORDS + 8
            || init.priority as usize >= PRIORITY_CNT
        {
            return Err(FosError::InvalidArg);
        }

        let mem_size = init.stack_size + init.heap_size;
        let base = self
            .heaps
            .threads
            .alloc(mem_size)
            .ok_or(FosError::OutOfMemory)?;

        let kmem = match self.heaps.kernel.alloc(core::mem::size_of::<Thread>() as u32) {
            Some(k) => k,
            None => {
                self.heaps.threads.free(base);
                return Err(FosError::OutOfMemory);
            }
        };

        let semb = match self.create_semb(SembState::Locked) {
            Ok(d) => d,
            Err(e) => {
                self.heaps.kernel.free(kmem);
                self.heaps.threads.free(base);
                return Err(e);
            }
        };

        let Some(slot) = self.threads.iter().position(|t| t.is_none()) else {
            let _ = self.delete_semb(semb, 0);
            self.heaps.kernel.free(kmem);
            self.heaps.threads.free(base);
            return Err(FosError::NoFreeSlot);
        };

        let mut thr = Thread::new(
            init.name,
            ThreadCSet {
                base_sp: base,
                stack_size: init.stack_size,
                entry: init.entry,
                alloc: init.alloc,
                semb,
            },
            init.priority,
        );
        let sp = context::init_thread_stack(&mut self.heaps.threads, base, init.stack_size, init.entry);
        thr.var.init_sp = sp;
        thr.var.sp = sp;
        thr.kmem = kmem;
        thr.parent_desc = self.parent_desc();
        thr.user_desc = self.gen_user_desc();
        thr.set_registered()?;

        let desc = thr.user_desc;
        log::info!("created thread '{}' desc {} slot {}", thr.name, desc, slot);
        self.threads[slot] = Some(thr);
        self.thread_max_ind = max_ind_of(&self.threads);
        Ok(desc)
    }

    pub fn run_id(&mut self, id: ThrId) -> Result<(), FosError> {
        self.threads
            .get_mut(id as usize)
            .and_then(|t| t.as_mut())
            .ok_or(FosError::BadDescriptor)?
            .set_running()
    }

    pub fn run_desc(&mut self, desc: UserDesc) -> Result<(), FosError> {
        let id = self.thread_id_by_desc(desc).ok_or(FosError::BadDescriptor)?;
        self.run_id(id)
    }

    /// Flag a thread for the reaper. Terminating the current thread
    /// also gives the CPU back to the kernel.
    pub fn terminate_id(&mut self, id: ThrId, code: i32) -> Result<(), FosError> {
        self.threads
            .get_mut(id as usize)
            .and_then(|t| t.as_mut())
            .ok_or(FosError::BadDescriptor)?
            .set_terminate(code)?;
        log::info!("thread slot {} terminating with code {}", id, code);
        if id == self.current_thr {
            context::request_kernel_mode(&mut self.mgv, false);
        }
        Ok(())
    }

    pub fn terminate_desc(&mut self, desc: UserDesc, code: i32) -> Result<(), FosError> {
        let id = self.thread_id_by_desc(desc).ok_or(FosError::BadDescriptor)?;
        self.terminate_id(id, code)
    }

    pub fn terminate_current(&mut self, code: i32) -> Result<(), FosError> {
        self.terminate_id(self.current_thr, code)
    }

    pub fn is_thread_alive(&self, desc: UserDesc) -> bool {
        self.thread_id_by_desc(desc).is_some()
    }

    /// The thread's private binary semaphore; what `join` takes.
    pub fn thread_semb_desc(&self, desc: UserDesc) -> UserDesc {
        match self.thread_id_by_desc(desc) {
            Some(id) => match self.threads[id as usize].as_ref() {
                Some(t) => t.cset.semb,
                None => WRONG_USER_DESC,
            },
            None => WRONG_USER_DESC,
        }
    }

    pub fn sleep_id(&mut self, id: ThrId, time_ms: u32, now_ms: u32) -> Result<(), FosError> {
        let thr = self
            .threads
            .get_mut(id as usize)
            .and_then(|t| t.as_mut())
            .ok_or(FosError::BadDescriptor)?;
        // Sleep(0) degenerates to a yield: the thread stays runnable and
        // only gives up the remainder of its slice.
        if time_ms != 0 {
            thr.sleep(time_ms, now_ms);
        }
        if id == self.current_thr {
            context::request_kernel_mode(&mut self.mgv, false);
        }
        Ok(())
    }

    pub fn sleep_current(&mut self, time_ms: u32, now_ms: u32) -> Result<(), FosError> {
        self.sleep_id(self.current_thr, time_ms, now_ms)
    }

    pub fn yield_now(&mut self) {
        context::request_kernel_mode(&mut self.mgv, false);
    }

    /// Park a thread on the blocker-object lock bit.
    fn lock_thread(&mut self, id: ThrId, now_ms: u32) {
        if let Some(t) = self.threads.get_mut(id as usize).and_then(|t| t.as_mut()) {
            t.lock(LockMask::OBJ, now_ms);
        }
        if id == self.current_thr {
            context::request_kernel_mode(&mut self.mgv, false);
        }
    }

    /// Release the blocker-object lock bit; tolerant of sentinel ids
    /// popping out of scrubbed waiter slots.
    fn unlock_thread(&mut self, id: ThrId, now_ms: u32) {
        if let Some(t) = self.threads.get_mut(id as usize).and_then(|t| t.as_mut()) {
            t.unlock(LockMask::OBJ, now_ms);
        }
    }

    // ------------------------------------------------------------------
    // Binary semaphores
    // ------------------------------------------------------------------

    pub fn create_semb(&mut self, init_state: SembState) -> Result<UserDesc, FosError> {
        let Some(slot) = self.semb.iter().position(|s| s.is_none()) else {
            return Err(FosError::NoFreeSlot);
        };
        let kmem = self
            .heaps
            .kernel
            .alloc(core::mem::size_of::<SemBinary>() as u32)
            .ok_or(FosError::OutOfMemory)?;

        let mut sem = SemBinary::new(init_state);
        sem.kmem = kmem;
        sem.user_desc = self.gen_user_desc();
        let desc = sem.user_desc;
        self.semb[slot] = Some(sem);
        self.semb_max_ind = max_ind_of(&self.semb);
        Ok(desc)
    }

    /// Delete a binary semaphore: queue its memory for the deferred
    /// free, wake every waiter, clear the slot.
    pub fn delete_semb(&mut self, desc: UserDesc, now_ms: u32) -> Result<(), FosError> {
        let id = self.semb_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let kmem = self.semb[id].as_ref().map(|s| s.kmem).unwrap_or(0);
        if kmem != 0 {
            self.push_del(kmem, ArenaId::Kernel)?;
        }
        loop {
            let woken = self.semb[id].as_mut().and_then(|s| s.blocker.give(false));
            match woken {
                Some(thr) => self.unlock_thread(thr, now_ms),
                None => break,
            }
        }
        self.semb[id] = None;
        self.semb_max_ind = max_ind_of(&self.semb);
        Ok(())
    }

    pub fn semb_take_current(&mut self, desc: UserDesc, now_ms: u32) -> Result<(), FosError> {
        let id = self.semb_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let cur = self.current_thr;
        let outcome = self.semb[id]
            .as_mut()
            .ok_or(FosError::BadDescriptor)?
            .take(cur)?;
        if outcome == TakeOutcome::MustBlock {
            self.lock_thread(cur, now_ms);
        }
        Ok(())
    }

    pub fn semb_take_stat(&self, desc: UserDesc) -> Result<(), FosError> {
        let id = self.semb_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        self.semb[id].as_ref().ok_or(FosError::BadDescriptor)?.take_stat()
    }

    pub fn semb_give(&mut self, desc: UserDesc, now_ms: u32) -> Result<(), FosError> {
        let id = self.semb_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let woken = self.semb[id]
            .as_mut()
            .ok_or(FosError::BadDescriptor)?
            .give(now_ms);
        if let Some(thr) = woken {
            self.unlock_thread(thr, now_ms);
        }
        Ok(())
    }

    pub fn semb_set_timeout(
        &mut self,
        desc: UserDesc,
        timeout_ms: u32,
        now_ms: u32,
    ) -> Result<(), FosError> {
        let id = self.semb_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        self.semb[id]
            .as_mut()
            .ok_or(FosError::BadDescriptor)?
            .timeout
            .configure(timeout_ms, now_ms);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Counting semaphores
    // ------------------------------------------------------------------

    pub fn create_semc(&mut self, max_cnt: u32, init_cnt: u32) -> Result<UserDesc, FosError> {
        if max_cnt == 0 {
            return Err(FosError::InvalidArg);
        }
        let Some(slot) = self.semc.iter().position(|s| s.is_none()) else {
            return Err(FosError::NoFreeSlot);
        };
        let kmem = self
            .heaps
            .kernel
            .alloc(core::mem::size_of::<SemCounting>() as u32)
            .ok_or(FosError::OutOfMemory)?;

        let mut sem = SemCounting::new(max_cnt, init_cnt);
        sem.kmem = kmem;
        sem.user_desc = self.gen_user_desc();
        let desc = sem.user_desc;
        self.semc[slot] = Some(sem);
        self.semc_max_ind = max_ind_of(&self.semc);
        Ok(desc)
    }

    pub fn delete_semc(&mut self, desc: UserDesc, now_ms: u32) -> Result<(), FosError> {
        let id = self.semc_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let kmem = self.semc[id].as_ref().map(|s| s.kmem).unwrap_or(0);
        if kmem != 0 {
            self.push_del(kmem, ArenaId::Kernel)?;
        }
        loop {
            let woken = self.semc[id].as_mut().and_then(|s| s.blocker.give(false));
            match woken {
                Some(thr) => self.unlock_thread(thr, now_ms),
                None => break,
            }
        }
        self.semc[id] = None;
        self.semc_max_ind = max_ind_of(&self.semc);
        Ok(())
    }

    pub fn semc_take_current(&mut self, desc: UserDesc, now_ms: u32) -> Result<(), FosError> {
        let id = self.semc_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let cur = self.current_thr;
        let outcome = self.semc[id]
            .as_mut()
            .ok_or(FosError::BadDescriptor)?
            .take(Some(cur))?;
        if outcome == TakeOutcome::MustBlock {
            self.lock_thread(cur, now_ms);
        }
        Ok(())
    }

    pub fn semc_take_stat(&self, desc: UserDesc) -> Result<(), FosError> {
        let id = self.semc_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        self.semc[id].as_ref().ok_or(FosError::BadDescriptor)?.take_stat()
    }

    pub fn semc_give(&mut self, desc: UserDesc, now_ms: u32) -> Result<(), FosError> {
        let id = self.semc_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let woken = self.semc[id]
            .as_mut()
            .ok_or(FosError::BadDescriptor)?
            .give(now_ms);
        if let Some(thr) = woken {
            self.unlock_thread(thr, now_ms);
        }
        Ok(())
    }

    pub fn semc_set_timeout(
        &mut self,
        desc: UserDesc,
        timeout_ms: u32,
        now_ms: u32,
    ) -> Result<(), FosError> {
        let id = self.semc_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        self.semc[id]
            .as_mut()
            .ok_or(FosError::BadDescriptor)?
            .timeout
            .configure(timeout_ms, now_ms);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queue32
    // ------------------------------------------------------------------

    /// Create a queue with its element buffer in the threads arena and
    /// a paired counting semaphore mirroring the element count.
    pub fn create_queue32(
        &mut self,
        size: u16,
        mode: QueueMode,
        timeout_ms: u32,
        now_ms: u32,
    ) -> Result<UserDesc, FosError> {
        if size == 0 {
            return Err(FosError::InvalidArg);
        }
        let buf = self
            .heaps
            .threads
            .alloc(4 * size as u32)
            .ok_or(FosError::OutOfMemory)?;
        let kmem = match self.heaps.kernel.alloc(core::mem::size_of::<Queue32>() as u32) {
            Some(k) => k,
            None => {
                self.heaps.threads.free(buf);
                return Err(FosError::OutOfMemory);
            }
        };
        let semc_desc = match self.create_semc(size as u32, 0) {
            Ok(d) => d,
            Err(e) => {
                self.heaps.kernel.free(kmem);
                self.heaps.threads.free(buf);
                return Err(e);
            }
        };
        self.semc_set_timeout(semc_desc, timeout_ms, now_ms)?;

        let Some(slot) = self.queues.iter().position(|q| q.is_none()) else {
            let _ = self.delete_semc(semc_desc, 0);
            self.heaps.kernel.free(kmem);
            self.heaps.threads.free(buf);
            return Err(FosError::NoFreeSlot);
        };

        let mut q = Queue32::new(buf, size, mode);
        q.semc_id = self.semc_id_by_desc(semc_desc).unwrap_or(crate::types::WRONG_SEM_CNT_ID);
        q.kmem = kmem;
        q.user_desc = self.gen_user_desc();
        let desc = q.user_desc;
        self.queues[slot] = Some(q);
        self.queue32_max_ind = max_ind_of(&self.queues);
        Ok(desc)
    }

    /// Delete a queue, its buffer and its paired semaphore.
    pub fn delete_queue32(&mut self, desc: UserDesc, now_ms: u32) -> Result<(), FosError> {
        let id = self.queue_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let (kmem, buf, semc_id) = match self.queues[id].as_ref() {
            Some(q) => (q.kmem, q.buf_off(), q.semc_id),
            None => return Err(FosError::BadDescriptor),
        };
        if kmem != 0 {
            self.push_del(kmem, ArenaId::Kernel)?;
        }
        self.push_del(buf, ArenaId::Threads)?;

        if let Some(semc_desc) = self
            .semc
            .get(semc_id as usize)
            .and_then(|s| s.as_ref())
            .map(|s| s.user_desc)
        {
            let _ = self.delete_semc(semc_desc, now_ms);
        }

        self.queues[id] = None;
        self.queue32_max_ind = max_ind_of(&self.queues);
        Ok(())
    }

    /// Producer side: push the element, then give the paired semaphore.
    /// A full buffer fails without touching either.
    pub fn queue32_write(&mut self, desc: UserDesc, data: u32, now_ms: u32) -> Result<(), FosError> {
        let id = self.queue_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let semc_id = {
            let q = self.queues[id].as_mut().ok_or(FosError::BadDescriptor)?;
            q.write(&mut self.heaps.threads, data)?;
            q.semc_id
        };
        if let Some(sem) = self.semc.get_mut(semc_id as usize).and_then(|s| s.as_mut()) {
            if let Some(thr) = sem.give(now_ms) {
                self.unlock_thread(thr, now_ms);
            }
        }
        Ok(())
    }

    /// Consumer side, step 1: take the paired semaphore. Blocking is
    /// only honored for a PollAndBlock queue asked from user mode.
    pub fn queue32_ask(
        &mut self,
        desc: UserDesc,
        blocking: Blocking,
        now_ms: u32,
    ) -> Result<(), FosError> {
        let id = self.queue_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let (semc_id, mode) = match self.queues[id].as_ref() {
            Some(q) => (q.semc_id, q.mode),
            None => return Err(FosError::BadDescriptor),
        };
        let waiter = match (blocking, mode, self.mgv.mode) {
            (Blocking::Block, QueueMode::PollAndBlock, WorkMode::User) => Some(self.current_thr),
            _ => None,
        };
        let outcome = self
            .semc
            .get_mut(semc_id as usize)
            .and_then(|s| s.as_mut())
            .ok_or(FosError::BadDescriptor)?
            .take(waiter)?;
        if outcome == TakeOutcome::MustBlock {
            let cur = self.current_thr;
            self.lock_thread(cur, now_ms);
        }
        Ok(())
    }

    /// Consumer side, step 2: pop the element asked for.
    pub fn queue32_read(&mut self, desc: UserDesc) -> Result<u32, FosError> {
        let id = self.queue_id_by_desc(desc).ok_or(FosError::BadDescriptor)? as usize;
        let q = self.queues[id].as_mut().ok_or(FosError::BadDescriptor)?;
        q.read(&self.heaps.threads)
    }

    // ------------------------------------------------------------------
    // Writer objects
    // ------------------------------------------------------------------

    /// Register a writer object with a buffered-write block from the
    /// threads arena. The file-service thread will service it.
    pub fn fwriter_reg(
        &mut self,
        service: &'static dyn crate::fwriter::WriterService,
        buf_len: u16,
    ) -> Result<u8, FosError> {
        if buf_len == 0 {
            return Err(FosError::InvalidArg);
        }
        let buf_len = buf_len.min(crate::config::FILEWR_MAX_BUF_LEN);

        let duplicate = self.writers.iter().flatten().any(|w| {
            core::ptr::eq(
                w.service as *const dyn crate::fwriter::WriterService as *const (),
                service as *const dyn crate::fwriter::WriterService as *const (),
            )
        });
        if duplicate {
            return Err(FosError::WrongState);
        }

        let Some(slot) = self.writers.iter().position(|w| w.is_none()) else {
            return Err(FosError::NoFreeSlot);
        };
        let buf = self
            .heaps
            .threads
            .alloc(buf_len as u32)
            .ok_or(FosError::OutOfMemory)?;

        self.writers[slot] = Some(WriterSlot {
            service,
            buf,
            buf_len,
        });
        self.fwriter_max_ind = max_ind_of(&self.writers);
        log::info!("registered writer object in slot {}", slot);
        Ok(slot as u8)
    }

    /// Snapshot of the registered writer services for the service
    /// thread; taken under the kernel lock, serviced outside it.
    pub fn fwriter_services(
        &self,
        out: &mut heapless::Vec<&'static dyn crate::fwriter::WriterService, FWRITER_CNT>,
    ) {
        out.clear();
        for i in 0..=self.fwriter_max_ind as usize {
            if let Some(w) = self.writers[i].as_ref() {
                let _ = out.push(w.service);
            }
        }
    }

    // ------------------------------------------------------------------
    // Errors and the deferred-free list
    // ------------------------------------------------------------------

    /// Latch an error and hand it to the platform sink. The sink does
    /// not return on production ports.
    pub fn error_set(&mut self, code: u32, user_desc: UserDesc, msg: &str) {
        log::error!("kernel error {}: {} (desc {})", code, msg, user_desc);
        self.error.set(code, user_desc, msg);
        platform::port().error_sink(code, msg);
    }

    fn push_del(&mut self, off: u32, arena: ArenaId) -> Result<(), FosError> {
        self.del_list
            .push(DelEntry { off, arena })
            .map_err(|_| FosError::NoFreeSlot)
    }

    fn drain_del_list(&mut self) {
        while let Some(entry) = self.del_list.pop() {
            self.heaps.free(entry);
        }
    }

    // ------------------------------------------------------------------
    // Reaper
    // ------------------------------------------------------------------

    /// Finalize TERMINATING threads: delete the thread's own binary
    /// semaphore (which releases its joiners), scrub the thread id out
    /// of every waiter ring in the system, then queue the thread memory
    /// for the deferred free unless it was statically allocated.
    fn reap(&mut self, now_ms: u32) {
        let mut upd_needed = false;

        for i in 0..=self.thread_max_ind as usize {
            let Some((mode, semb, alloc)) = self.threads[i]
                .as_ref()
                .map(|t| (t.var.mode, t.cset.semb, t.cset.alloc))
            else {
                continue;
            };

            if mode == ThreadMode::Terminating {
                let _ = self.delete_semb(semb, now_ms);
                self.unlink_thread_everywhere(i as ThrId);
                if let Some(t) = self.threads[i].as_mut() {
                    t.var.mode = ThreadMode::Terminated;
                    log::info!("reaped thread '{}' (code {})", t.name, t.var.terminate_code);
                }
            }

            let Some((mode, base, kmem)) = self.threads[i]
                .as_ref()
                .map(|t| (t.var.mode, t.cset.base_sp, t.kmem))
            else {
                continue;
            };
            if mode == ThreadMode::Terminated && alloc != AllocMode::Static {
                if base != 0 {
                    if self.push_del(base, ArenaId::Threads).is_ok() {
                        if let Some(t) = self.threads[i].as_mut() {
                            t.cset.base_sp = 0;
                        }
                    } else {
                        continue; // full list; retried next pass
                    }
                }
                if self.push_del(kmem, ArenaId::Kernel).is_ok() {
                    self.threads[i] = None;
                    upd_needed = true;
                }
            }
        }

        if upd_needed {
            self.thread_max_ind = max_ind_of(&self.threads);
        }
    }

    /// A dying thread may sit in any waiter ring; scrub them all.
    fn unlink_thread_everywhere(&mut self, thr_id: ThrId) {
        for i in 0..=self.semb_max_ind as usize {
            if let Some(s) = self.semb[i].as_mut() {
                s.unlink(thr_id);
            }
        }
        for i in 0..=self.semc_max_ind as usize {
            if let Some(s) = self.semc[i].as_mut() {
                s.unlink(thr_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------

    /// One kernel pass. Runs in kernel mode on the kernel stack.
    pub fn main_loop_proc(&mut self, now_ms: u32) {
        self.drain_del_list();

        if let Some(arena) = self.heaps.integrity_pass(now_ms) {
            match arena {
                ArenaId::Kernel => {
                    self.error_set(ERROR_KERNEL_HEAP, 0, "bad tag in kernel arena")
                }
                ArenaId::Threads => {
                    self.error_set(ERROR_THREADS_HEAP, 0, "bad tag in threads arena")
                }
            }
        }

        if !self.enabled {
            return;
        }

        self.reap(now_ms);

        if self.sys_stack_dbg.probe(&self.kernel_stack, now_ms) {
            self.error_set(ERROR_KERNEL_STACK, 0, "kernel stack overflow");
        }

        // Timed wake-ups and per-thread stack probes.
        let mut stack_over: Option<UserDesc> = None;
        {
            let Fos {
                threads,
                heaps,
                thread_max_ind,
                ..
            } = self;
            for i in 0..=*thread_max_ind as usize {
                let Some(t) = threads[i].as_mut() else {
                    continue;
                };
                if t.var.mode != ThreadMode::Run {
                    continue;
                }
                t.proc_state(now_ms);
                if t.cset.base_sp != 0 {
                    let stack = heaps.threads.bytes(t.cset.base_sp, t.cset.stack_size);
                    if t.dbg.probe(stack, now_ms) {
                        stack_over = Some(t.user_desc);
                    }
                }
            }
        }
        if let Some(desc) = stack_over {
            self.error_set(ERROR_THREADS_STACK, desc, "thread stack overflow");
        }

        // Semaphore timeout sweeps.
        for i in 0..=self.semb_max_ind as usize {
            let woken = self.semb[i].as_mut().and_then(|s| s.sweep(now_ms));
            if let Some(thr) = woken {
                self.unlock_thread(thr, now_ms);
            }
        }
        for i in 0..=self.semc_max_ind as usize {
            let woken = self.semc[i].as_mut().and_then(|s| s.sweep(now_ms));
            if let Some(thr) = woken {
                self.unlock_thread(thr, now_ms);
            }
        }

        if self.schedule(now_ms).is_some() {
            context::request_user_mode(&self.mgv);
        }
    }

    /// Statistics, the scheduling decision and the stack-pointer swap.
    fn schedule(&mut self, now_ms: u32) -> Option<ThrId> {
        let dt = self.mgv.thr_dt_us;
        self.sched
            .account(self.thread_max_ind, self.current_thr, dt, now_ms);

        let next = self.sched.pick_next(&self.threads, self.thread_max_ind)?;

        // Save the outgoing thread.
        if let Some(cur) = self.threads[self.current_thr as usize].as_mut() {
            cur.var.sp = self.mgv.user_sp;
            if cur.var.state == thread::ThreadState::Running {
                cur.var.state = thread::ThreadState::Ready;
            }
        }

        // Load the incoming one.
        let thr = self.threads[next as usize].as_mut()?;
        self.current_thr = next;
        thr.var.state = thread::ThreadState::Running;
        self.mgv.user_sp = thr.var.sp;
        Some(next)
    }

    /// Arena accounting, used by diagnostics and the reclamation tests.
    pub fn arena_used(&self, arena: ArenaId) -> u32 {
        match arena {
            ArenaId::Kernel => self.heaps.kernel.used_bytes(),
            ArenaId::Threads => self.heaps.threads.used_bytes(),
        }
    }
}

/// Largest occupied slot, the scan bound for every registry walk.
fn max_ind_of<T>(list: &[Option<T>]) -> u8 {
    let mut ind = 0;
    for (i, slot) in list.iter().enumerate() {
        if slot.is_some() {
            ind = i as u8;
        }
    }
    ind
}

/// The idle thread: always runnable, lowest priority, never blocks.
fn idle_main() {
    loop {
        core::hint::spin_loop();
    }
}

lazy_static! {
    static ref FOS: Mutex<Fos> = Mutex::new(Fos::new());
}

/// Run `f` on the kernel singleton with interrupts masked. From-ISR
/// entry points use the same path, so a preempted lock holder cannot
/// exist while an interrupt handler runs.
pub fn with_fos<R>(f: impl FnOnce(&mut Fos) -> R) -> R {
    platform::without_interrupts(|| f(&mut FOS.lock()))
}

/// Whether `start()` has run; usable from interrupt context.
pub fn os_enabled() -> bool {
    OS_ENABLED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_port;
    use crate::types::INF_TIME;

    fn fresh() -> Fos {
        test_port::setup();
        let _ = env_logger::builder().is_test(true).try_init();
        let mut fos = Fos::new();
        fos.init();
        fos.start().unwrap();
        // Park the file-service thread the way it parks itself when no
        // writer has pending data, so it stays out of the scenarios.
        fos.sleep_id(1, INF_TIME, 0).unwrap();
        fos
    }

    fn worker(name: &'static str, priority: u8) -> ThreadUserInit {
        ThreadUserInit {
            name,
            entry: || {},
            stack_size: 0x200,
            heap_size: 0x100,
            priority,
            alloc: AllocMode::Auto,
        }
    }

    /// Run kernel passes until the scheduler settles on a thread, then
    /// enter user mode like the hardware switch would.
    fn pass(fos: &mut Fos, now: u32) -> ThrId {
        if fos.mgv.mode == WorkMode::User {
            context::switch_context(&mut fos.mgv);
        }
        fos.main_loop_proc(now);
        let _ = test_port::take_pends();
        context::switch_context(&mut fos.mgv);
        fos.current_thread()
    }

    #[test]
    fn test_init_provisions_idle_and_fproc() {
        let fos = fresh();
        let idle = fos.threads[0].as_ref().unwrap();
        assert_eq!(idle.name.as_str(), "Idle");
        assert_eq!(idle.priority as usize, PRIORITY_CNT - 1);
        let fproc = fos.threads[1].as_ref().unwrap();
        assert_eq!(fproc.name.as_str(), "FProc");
        assert_eq!(fproc.parent_desc, KERNEL_USER_DESC);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut fos = fresh();
        assert_eq!(fos.start(), Err(FosError::WrongState));
    }

    #[test]
    fn test_descriptor_generation_skips_reserved() {
        let mut fos = Fos::new();
        fos.last_user_desc = u32::MAX - 1;
        assert_eq!(fos.gen_user_desc(), u32::MAX);
        // Wraps over 0 (WRONG) and 1 (KERNEL).
        assert_eq!(fos.gen_user_desc(), 2);
    }

    #[test]
    fn test_thread_table_capacity_is_bounded() {
        let mut fos = fresh();
        let mut made = 0;
        loop {
            match fos.create_thread(&worker("w", 3)) {
                Ok(_) => made += 1,
                Err(e) => {
                    // Either the table or an arena fills; both are FAIL
                    // with no descriptor handed out.
                    assert!(matches!(e, FosError::NoFreeSlot | FosError::OutOfMemory));
                    break;
                }
            }
            assert!(made <= MAX_THR_CNT);
        }
    }

    #[test]
    fn test_create_thread_rolls_back_on_table_full() {
        let mut fos = fresh();
        while fos.create_thread(&worker("w", 3)).is_ok() {}
        let used_t = fos.arena_used(ArenaId::Threads);
        let used_k = fos.arena_used(ArenaId::Kernel);
        let semb_max = fos.semb_max_ind;
        assert!(fos.create_thread(&worker("x", 3)).is_err());
        assert_eq!(fos.arena_used(ArenaId::Threads), used_t);
        assert_eq!(fos.arena_used(ArenaId::Kernel), used_k);
        assert_eq!(fos.semb_max_ind, semb_max);
    }

    #[test]
    fn test_scheduler_prefers_high_priority_worker() {
        let mut fos = fresh();
        let hi = fos.create_thread(&worker("hi", 1)).unwrap();
        fos.run_desc(hi).unwrap();
        let id = pass(&mut fos, 1);
        assert_eq!(fos.threads[id as usize].as_ref().unwrap().user_desc, hi);
    }

    #[test]
    fn test_yield_rotates_same_priority_threads() {
        let mut fos = fresh();
        let a = fos.create_thread(&worker("a", 2)).unwrap();
        let b = fos.create_thread(&worker("b", 2)).unwrap();
        fos.run_desc(a).unwrap();
        fos.run_desc(b).unwrap();

        let first = pass(&mut fos, 1);
        fos.yield_now();
        let second = pass(&mut fos, 2);
        fos.yield_now();
        let third = pass(&mut fos, 3);

        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_sleep_blocks_until_deadline() {
        let mut fos = fresh();
        let w = fos.create_thread(&worker("w", 2)).unwrap();
        fos.run_desc(w).unwrap();
        let wid = fos.thread_id_by_desc(w).unwrap();

        assert_eq!(pass(&mut fos, 1), wid);
        fos.sleep_current(20, 1).unwrap();

        // While sleeping, idle (slot 0) runs.
        assert_eq!(pass(&mut fos, 2), 0);
        assert_eq!(pass(&mut fos, 10), 0);
        // Deadline passed: the worker is back.
        assert_eq!(pass(&mut fos, 21), wid);
    }

    #[test]
    fn test_sleep_zero_acts_like_yield() {
        let mut fos = fresh();
        let a = fos.create_thread(&worker("a", 2)).unwrap();
        let b = fos.create_thread(&worker("b", 2)).unwrap();
        fos.run_desc(a).unwrap();
        fos.run_desc(b).unwrap();

        let first = pass(&mut fos, 5);
        fos.sleep_current(0, 5).unwrap();
        let second = pass(&mut fos, 5);
        assert_ne!(first, second);
    }

    #[test]
    fn test_scenario_fifo_wake_order() {
        let mut fos = fresh();
        let sem = fos.create_semb(SembState::Locked).unwrap();

        let t: Vec<UserDesc> = (0..3)
            .map(|i| {
                let d = fos
                    .create_thread(&worker(["t1", "t2", "t3"][i], 2))
                    .unwrap();
                fos.run_desc(d).unwrap();
                d
            })
            .collect();

        // Each worker takes the locked semaphore as it gets the CPU.
        for _ in 0..3 {
            let cur = pass(&mut fos, 1);
            let desc = fos.threads[cur as usize].as_ref().unwrap().user_desc;
            assert!(t.contains(&desc));
            fos.semb_take_current(sem, 1).unwrap();
        }

        // All three are blocked; idle runs.
        assert_eq!(pass(&mut fos, 2), 0);

        // Gives release strictly in take order.
        for expect in &t {
            fos.semb_give(sem, 3).unwrap();
            let cur = pass(&mut fos, 3);
            let desc = fos.threads[cur as usize].as_ref().unwrap().user_desc;
            assert_eq!(desc, *expect);
            fos.sleep_current(INF_TIME, 3).unwrap(); // park it again
        }
    }

    #[test]
    fn test_scenario_priority_preemption() {
        let mut fos = fresh();
        let sem = fos.create_semb(SembState::Locked).unwrap();

        let lo = fos.create_thread(&worker("lo", 5)).unwrap();
        let hi = fos.create_thread(&worker("hi", 1)).unwrap();
        fos.run_desc(lo).unwrap();
        fos.run_desc(hi).unwrap();
        let lo_id = fos.thread_id_by_desc(lo).unwrap();
        let hi_id = fos.thread_id_by_desc(hi).unwrap();

        // The high-priority thread runs first and blocks on the sem.
        assert_eq!(pass(&mut fos, 1), hi_id);
        fos.semb_take_current(sem, 1).unwrap();

        // Now the low-priority looper owns the CPU.
        assert_eq!(pass(&mut fos, 2), lo_id);
        fos.yield_now();
        assert_eq!(pass(&mut fos, 3), lo_id);

        // Give: the next decision must be the high-priority thread.
        fos.semb_give(sem, 4).unwrap();
        assert_eq!(pass(&mut fos, 4), hi_id);
    }

    #[test]
    fn test_scenario_take_timeout_reports_fail() {
        let mut fos = fresh();
        let sem = fos.create_semb(SembState::Locked).unwrap();
        fos.semb_set_timeout(sem, 50, 10).unwrap();

        let w = fos.create_thread(&worker("w", 2)).unwrap();
        fos.run_desc(w).unwrap();
        let wid = fos.thread_id_by_desc(w).unwrap();

        assert_eq!(pass(&mut fos, 10), wid);
        fos.semb_take_current(sem, 10).unwrap();
        assert_eq!(pass(&mut fos, 11), 0); // blocked; idle runs

        // Before the deadline nothing happens.
        assert_eq!(pass(&mut fos, 40), 0);
        // ~50 ms later the sweep releases the waiter with the timeout
        // tag; the wake lands in the following pass's state step.
        assert_eq!(pass(&mut fos, 61), 0);
        assert_eq!(pass(&mut fos, 62), wid);
        assert_eq!(fos.semb_take_stat(sem), Err(FosError::Timeout));
    }

    #[test]
    fn test_scenario_queue_producer_consumer() {
        let mut fos = fresh();
        let q = fos.create_queue32(4, QueueMode::PollAndBlock, 0, 1).unwrap();
        let input = [7u32, 11, 13, 17, 19];

        let cons = fos.create_thread(&worker("cons", 2)).unwrap();
        fos.run_desc(cons).unwrap();
        let cons_id = fos.thread_id_by_desc(cons).unwrap();

        let mut received = Vec::new();
        let mut next = 0usize;
        let mut now = 1;
        // Set once the consumer parked inside a blocking ask; its
        // wake-up then carries the granted unit.
        let mut have_grant = false;

        'system: while received.len() < input.len() {
            now += 1;
            // Producer side: post one element per cycle from kernel
            // context while the consumer runs or waits.
            if next < input.len() && fos.queue32_write(q, input[next], now).is_ok() {
                next += 1;
            }

            if pass(&mut fos, now) != cons_id {
                continue;
            }
            // Consumer program: ask (blocking), then read.
            loop {
                if !have_grant {
                    fos.queue32_ask(q, Blocking::Block, now).unwrap();
                    let state = fos.threads[cons_id as usize].as_ref().unwrap().var.state;
                    if state == thread::ThreadState::Blocked {
                        have_grant = true; // resumes holding the unit
                        continue 'system;
                    }
                }
                have_grant = false;
                received.push(fos.queue32_read(q).unwrap());
            }
        }
        assert_eq!(received, input);
    }

    #[test]
    fn test_queue_write_full_fails_cleanly() {
        let mut fos = fresh();
        let q = fos.create_queue32(2, QueueMode::PollOnly, 0, 1).unwrap();
        fos.queue32_write(q, 1, 1).unwrap();
        fos.queue32_write(q, 2, 1).unwrap();
        assert_eq!(fos.queue32_write(q, 3, 1), Err(FosError::Full));

        // Poll-ask then read drains in order.
        fos.queue32_ask(q, Blocking::Poll, 1).unwrap();
        assert_eq!(fos.queue32_read(q), Ok(1));
        fos.queue32_ask(q, Blocking::Poll, 1).unwrap();
        assert_eq!(fos.queue32_read(q), Ok(2));
        fos.queue32_ask(q, Blocking::Poll, 1).unwrap();
        assert_eq!(fos.queue32_read(q), Err(FosError::Empty));
    }

    #[test]
    fn test_scenario_join_returns_after_termination() {
        let mut fos = fresh();
        let joiner = fos.create_thread(&worker("join", 2)).unwrap();
        let target = fos.create_thread(&worker("tgt", 3)).unwrap();
        fos.run_desc(joiner).unwrap();
        fos.run_desc(target).unwrap();
        let join_id = fos.thread_id_by_desc(joiner).unwrap();

        // The joiner blocks on the target's private semaphore.
        assert_eq!(pass(&mut fos, 1), join_id);
        let semb = fos.thread_semb_desc(target);
        assert_ne!(semb, WRONG_USER_DESC);
        fos.semb_take_current(semb, 1).unwrap();
        assert_ne!(pass(&mut fos, 2), join_id);

        // Target terminates; the reaper deletes its semaphore, which
        // releases the joiner.
        fos.terminate_desc(target, 0).unwrap();
        assert_eq!(pass(&mut fos, 3), join_id);
        assert!(!fos.is_thread_alive(target));
        assert_eq!(fos.thread_semb_desc(target), WRONG_USER_DESC);
    }

    #[test]
    fn test_scenario_reaper_returns_memory() {
        let mut fos = fresh();
        let baseline_t = fos.arena_used(ArenaId::Threads);
        let baseline_k = fos.arena_used(ArenaId::Kernel);

        for round in 0..1000u32 {
            let d = fos.create_thread(&worker("churn", 3)).unwrap();
            fos.run_desc(d).unwrap();
            fos.terminate_desc(d, 0).unwrap();
            // One pass reaps, the next drains the deferred-free list.
            let now = 10 + round;
            fos.main_loop_proc(now);
            fos.main_loop_proc(now);
            assert_eq!(fos.arena_used(ArenaId::Threads), baseline_t);
            assert_eq!(fos.arena_used(ArenaId::Kernel), baseline_k);
        }
    }

    #[test]
    fn test_reaper_unlinks_dead_waiter() {
        let mut fos = fresh();
        let sem = fos.create_semb(SembState::Locked).unwrap();
        let w = fos.create_thread(&worker("w", 2)).unwrap();
        fos.run_desc(w).unwrap();
        let wid = fos.thread_id_by_desc(w).unwrap();

        assert_eq!(pass(&mut fos, 1), wid);
        fos.semb_take_current(sem, 1).unwrap();
        fos.terminate_desc(w, -1).unwrap();
        let _ = pass(&mut fos, 2); // reaper runs

        // The dead thread is out of the ring: a give wakes nobody and
        // a sentinel never reaches the thread table.
        let sid = fos.semb_id_by_desc(sem).unwrap() as usize;
        assert_eq!(fos.semb[sid].as_ref().unwrap().blocker.len(), 1);
        fos.semb_give(sem, 3).unwrap();
        assert!(fos.threads[wid as usize].is_none());
    }

    #[test]
    fn test_deleted_semaphore_take_fails() {
        let mut fos = fresh();
        let before = fos.arena_used(ArenaId::Kernel);
        let sem = fos.create_semb(SembState::Unlocked).unwrap();
        assert!(fos.arena_used(ArenaId::Kernel) > before);

        fos.delete_semb(sem, 1).unwrap();
        assert_eq!(fos.semb_take_current(sem, 1), Err(FosError::BadDescriptor));
        assert_eq!(fos.semb_give(sem, 1), Err(FosError::BadDescriptor));

        // Memory returns once a pass drains the deferred-free list.
        fos.main_loop_proc(2);
        assert_eq!(fos.arena_used(ArenaId::Kernel), before);
    }

    #[test]
    fn test_delete_wakes_all_waiters() {
        let mut fos = fresh();
        let sem = fos.create_semb(SembState::Locked).unwrap();
        let a = fos.create_thread(&worker("a", 2)).unwrap();
        let b = fos.create_thread(&worker("b", 2)).unwrap();
        fos.run_desc(a).unwrap();
        fos.run_desc(b).unwrap();

        for _ in 0..2 {
            let _ = pass(&mut fos, 1);
            fos.semb_take_current(sem, 1).unwrap();
        }
        assert_eq!(pass(&mut fos, 2), 0); // both blocked

        fos.delete_semb(sem, 3).unwrap();
        let first = pass(&mut fos, 3);
        assert_ne!(first, 0);
        fos.sleep_current(INF_TIME, 3).unwrap();
        let second = pass(&mut fos, 3);
        assert_ne!(second, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn test_semc_give_from_kernel_context_wakes_waiter() {
        let mut fos = fresh();
        let sem = fos.create_semc(4, 0).unwrap();
        let w = fos.create_thread(&worker("w", 2)).unwrap();
        fos.run_desc(w).unwrap();
        let wid = fos.thread_id_by_desc(w).unwrap();

        assert_eq!(pass(&mut fos, 1), wid);
        fos.semc_take_current(sem, 1).unwrap();
        assert_eq!(pass(&mut fos, 2), 0);

        // Mirrors a give issued from an interrupt handler.
        fos.semc_give(sem, 3).unwrap();
        assert_eq!(pass(&mut fos, 3), wid);
        assert_eq!(fos.semc_take_stat(sem), Ok(()));
    }

    #[test]
    fn test_corrupted_arena_latches_error() {
        let mut fos = fresh();
        // Stray write into the first block header's state byte.
        fos.heaps.kernel.bytes_mut(4, 1)[0] = 0x99;
        fos.main_loop_proc(2 * crate::config::HEAP_CHECK_PERIOD_MS);
        assert_eq!(fos.latched_error().code, ERROR_KERNEL_HEAP);
        let errors = test_port::sunk_errors();
        assert!(errors.iter().any(|(c, _)| *c == ERROR_KERNEL_HEAP));
    }

    #[test]
    fn test_exactly_one_thread_running_per_pass() {
        let mut fos = fresh();
        let a = fos.create_thread(&worker("a", 2)).unwrap();
        let b = fos.create_thread(&worker("b", 4)).unwrap();
        fos.run_desc(a).unwrap();
        fos.run_desc(b).unwrap();

        for now in 1..8 {
            let cur = pass(&mut fos, now);
            let running: Vec<ThrId> = (0..MAX_THR_CNT as u8)
                .filter(|&i| {
                    fos.threads[i as usize]
                        .as_ref()
                        .is_some_and(|t| t.var.state == thread::ThreadState::Running)
                })
                .collect();
            assert_eq!(running, vec![cur]);
            fos.yield_now();
        }
    }

    #[test]
    fn test_main_loop_idles_before_start() {
        test_port::setup();
        let mut fos = Fos::new();
        fos.init();
        // Not started: the pass must not schedule anything.
        fos.main_loop_proc(10);
        assert_eq!(test_port::take_pends(), 0);
    }
}
