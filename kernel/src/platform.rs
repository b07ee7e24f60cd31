/*
 * Platform Port Interface
 *
 * Everything the kernel needs from the board lives behind this trait:
 * the millisecond tick, the one-shot slice timer, the pendable
 * context-switch interrupt, interrupt masking and the system-call trap.
 *
 * Port contract for the context switch:
 * - `pend_switch` must pend the lowest-priority software interrupt
 *   (PendSV on Cortex-M). Its handler saves the callee-saved integer and
 *   floating-point registers onto the active user stack, then calls
 *   `run::switch_handler()` and restores the registers of whichever stack
 *   the kernel selected. Caller-saved registers are stacked by the
 *   interrupt entry itself; the kernel depends on that convention.
 * - `svc` must deliver `{id, args}` to `syscall::dispatch`. On hardware
 *   this is the SVC instruction plus a handler that reads the two values
 *   from the pre-interrupt stack frame; a hosted port may forward
 *   directly.
 *
 * Stack pointers exchanged with the port are offsets into the thread
 * memory arena; the port adds the arena base address when it programs the
 * CPU stack pointer.
 */

use spin::Once;

pub trait Platform: Sync {
    /// Monotonic millisecond tick. Wraps with u32, as the rest of the
    /// kernel's time arithmetic expects.
    fn now_ms(&self) -> u32;

    /// Arm the one-shot slice timer with the given period.
    fn start_slice_timer(&self, period_us: u32);

    /// Stop the slice timer without clearing its counter.
    fn stop_slice_timer(&self);

    /// Microseconds elapsed on the slice timer since it was armed.
    fn read_slice_us(&self) -> u32;

    /// Pend the context-switch software interrupt.
    fn pend_switch(&self);

    /// Mask interrupts; returns the previous state for restore. Nestable.
    fn interrupts_disable(&self) -> u32;

    /// Restore the interrupt state returned by `interrupts_disable`.
    fn interrupts_restore(&self, state: u32);

    /// Raise the system-call trap carrying `{id, argument block}`.
    fn svc(&self, id: u32, args: *mut usize);

    /// Unrecoverable-error hook. The default halts in place so a debugger
    /// can inspect the latched error; ports may reset or record instead.
    fn error_sink(&self, code: u32, msg: &str) {
        let _ = (code, msg);
        loop {
            core::hint::spin_loop();
        }
    }
}

/// Port used before `install` is called. Every operation is inert, which
/// matches running the kernel state machine without hardware attached.
struct NullPort;

impl Platform for NullPort {
    fn now_ms(&self) -> u32 {
        0
    }
    fn start_slice_timer(&self, _period_us: u32) {}
    fn stop_slice_timer(&self) {}
    fn read_slice_us(&self) -> u32 {
        0
    }
    fn pend_switch(&self) {}
    fn interrupts_disable(&self) -> u32 {
        0
    }
    fn interrupts_restore(&self, _state: u32) {}
    fn svc(&self, _id: u32, _args: *mut usize) {}
    fn error_sink(&self, _code: u32, _msg: &str) {}
}

static NULL_PORT: NullPort = NullPort;
static PORT: Once<&'static dyn Platform> = Once::new();

/// Install the board port. The first call wins; later calls are ignored
/// and report `false`.
pub fn install(port: &'static dyn Platform) -> bool {
    let mut first = false;
    PORT.call_once(|| {
        first = true;
        port
    });
    first
}

/// The installed port, or the inert null port before installation.
pub fn port() -> &'static dyn Platform {
    match PORT.get() {
        Some(p) => *p,
        None => &NULL_PORT,
    }
}

/// Current millisecond tick from the port.
pub fn now_ms() -> u32 {
    port().now_ms()
}

/// Run `f` with interrupts masked.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let p = port();
    let state = p.interrupts_disable();
    let r = f();
    p.interrupts_restore(state);
    r
}
