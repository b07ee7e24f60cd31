/*
 * System-Call Gateway
 *
 * A fixed table of handlers keyed by a small integer. User code builds
 * an argument block on its own stack, raises the trap through the
 * platform, and the trap handler forwards `{id, block pointer}` here.
 * The handler writes its result into slot 0 of the block; the user side
 * reads it after the trap returns.
 *
 * The table refuses double registration and out-of-range ids, and
 * dispatch ignores unregistered ids entirely: the block is left
 * untouched, so the caller sees whatever failure value it pre-loaded.
 */

pub mod handlers;
pub mod numbers;

use spin::Mutex;

use crate::config::SYS_CALL_CNT;
use crate::platform;
use numbers::HARD_FAULT_CALL_ID;

/// Argument block: slot 0 is the return value, the rest are arguments.
pub const SVC_ARG_WORDS: usize = 4;
pub type ArgBlock = [usize; SVC_ARG_WORDS];

/// A kernel-side gate handler.
pub type SvcHandler = fn(&mut ArgBlock);

static CALL_TABLE: Mutex<[Option<SvcHandler>; SYS_CALL_CNT]> = Mutex::new([None; SYS_CALL_CNT]);

/// Register a handler. First registration of an id wins, matching the
/// boot-time-only population of the table.
pub fn register(id: u16, handler: SvcHandler) {
    if id as usize >= SYS_CALL_CNT {
        return;
    }
    let mut table = CALL_TABLE.lock();
    if table[id as usize].is_none() {
        table[id as usize] = Some(handler);
    }
}

/// User-side entry: raise the trap carrying the call id and the block.
pub fn system_call(id: u16, args: &mut ArgBlock) {
    platform::port().svc(id as u32, args.as_mut_ptr());
}

/// Trap-side entry: the port's trap handler forwards here.
///
/// The pointer must be the block passed to `system_call` on the current
/// thread's stack; it is only dereferenced for registered ids.
pub fn dispatch(id: u32, args: *mut usize) {
    if id == HARD_FAULT_CALL_ID as u32 {
        hard_fault();
    }
    if id as usize >= SYS_CALL_CNT {
        return;
    }
    let handler = CALL_TABLE.lock()[id as usize];
    let Some(handler) = handler else {
        return;
    };
    if args.is_null() {
        return;
    }
    // Safety: the block is live for the whole trap by the system_call
    // contract, and the table is only populated with handlers that
    // respect the block layout.
    let block = unsafe { &mut *(args as *mut ArgBlock) };
    handler(block);
}

/// Deliberate fault path for exercising the fault handler: read from
/// the null page.
fn hard_fault() {
    unsafe {
        core::ptr::read_volatile(core::ptr::null::<u32>());
    }
}
