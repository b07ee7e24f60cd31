/*
 * System Call Gate Handlers
 *
 * The kernel side of every call: unpack the argument block, run the
 * operation on the kernel singleton, pack the result back into slot 0.
 *
 * Argument blocks come from the calling thread's own stack. The two
 * calls that pass structures (`create_thread`, `error_set`) carry raw
 * pointers; they are only dereferenced for the duration of the trap,
 * which the calling convention guarantees is within the object's
 * lifetime.
 *
 * Every fallible operation collapses to the single FAIL word here.
 * User code that wants to distinguish a timeout from a plain failure
 * queries the take-stat calls.
 */

use super::numbers::*;
use super::{ArgBlock, register};
use crate::fwriter;
use crate::ipc::queue32::{Blocking, QueueMode};
use crate::platform;
use crate::scheduler::thread::ThreadUserInit;
use crate::scheduler::with_fos;
use crate::sync::semaphore::SembState;
use crate::types::{FosError, UserDesc, WRONG_USER_DESC};

const RET_OK: usize = 0;
const RET_FAIL: usize = 1;

fn ret_word(r: Result<(), FosError>) -> usize {
    match r {
        Ok(()) => RET_OK,
        Err(_) => RET_FAIL,
    }
}

fn desc_word(r: Result<UserDesc, FosError>) -> usize {
    r.unwrap_or(WRONG_USER_DESC) as usize
}

/// Populate the call table. Called once at kernel init, before the
/// first thread can trap.
pub fn init_gates() {
    register(SYSCALL_YIELD, gate_yield);
    register(SYSCALL_SLEEP, gate_sleep);

    register(SYSCALL_SEMB_TAKE, gate_semb_take);
    register(SYSCALL_SEMB_GIVE, gate_semb_give);
    register(SYSCALL_GET_THREAD_SEMB, gate_get_thread_semb);

    register(SYSCALL_CREATE_THREAD, gate_create_thread);
    register(SYSCALL_CREATE_SEMB, gate_create_semb);
    register(SYSCALL_DELETE_SEMB, gate_delete_semb);

    register(SYSCALL_THREAD_RUN, gate_thread_run);
    register(SYSCALL_THREAD_TERMINATE, gate_terminate);
    register(SYSCALL_THREAD_TERMINATE_DESC, gate_terminate_desc);

    register(SYSCALL_ERROR_SET, gate_error_set);

    register(SYSCALL_FILE_MOUNT, gate_file_mount);
    register(SYSCALL_FILE_UNMOUNT, gate_file_unmount);

    register(SYSCALL_SEMB_SET_TIMEOUT, gate_semb_set_timeout);

    register(SYSCALL_SEMC_TAKE, gate_semc_take);
    register(SYSCALL_SEMC_GIVE, gate_semc_give);
    register(SYSCALL_CREATE_SEMC, gate_create_semc);
    register(SYSCALL_DELETE_SEMC, gate_delete_semc);
    register(SYSCALL_SEMC_SET_TIMEOUT, gate_semc_set_timeout);

    register(SYSCALL_QUEUE32_CREATE, gate_queue32_create);
    register(SYSCALL_QUEUE32_DELETE, gate_queue32_delete);
    register(SYSCALL_QUEUE32_READ, gate_queue32_read);
    register(SYSCALL_QUEUE32_WRITE, gate_queue32_write);
    register(SYSCALL_QUEUE32_ASK, gate_queue32_ask);

    register(SYSCALL_SEMB_TAKE_STAT, gate_semb_take_stat);
    register(SYSCALL_SEMC_TAKE_STAT, gate_semc_take_stat);
}

fn gate_yield(_args: &mut ArgBlock) {
    with_fos(|f| f.yield_now());
}

fn gate_sleep(args: &mut ArgBlock) {
    let time_ms = args[1] as u32;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.sleep_current(time_ms, now)));
}

fn gate_semb_take(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.semb_take_current(desc, now)));
}

fn gate_semb_take_stat(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    args[0] = ret_word(with_fos(|f| f.semb_take_stat(desc)));
}

fn gate_semb_give(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.semb_give(desc, now)));
}

fn gate_get_thread_semb(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    args[0] = with_fos(|f| f.thread_semb_desc(desc)) as usize;
}

fn gate_create_thread(args: &mut ArgBlock) {
    let init_ptr = args[1] as *const ThreadUserInit;
    if init_ptr.is_null() {
        args[0] = WRONG_USER_DESC as usize;
        return;
    }
    // Safety: the block carries a pointer to the caller's init record,
    // alive until the trap returns.
    let init = unsafe { &*init_ptr };
    args[0] = desc_word(with_fos(|f| f.create_thread(init)));
}

fn gate_create_semb(args: &mut ArgBlock) {
    let state = if args[1] == 0 {
        SembState::Locked
    } else {
        SembState::Unlocked
    };
    args[0] = desc_word(with_fos(|f| f.create_semb(state)));
}

fn gate_delete_semb(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.delete_semb(desc, now)));
}

fn gate_thread_run(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    args[0] = ret_word(with_fos(|f| f.run_desc(desc)));
}

fn gate_terminate(args: &mut ArgBlock) {
    let code = args[1] as i32;
    args[0] = ret_word(with_fos(|f| f.terminate_current(code)));
}

fn gate_terminate_desc(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let code = args[2] as i32;
    args[0] = ret_word(with_fos(|f| f.terminate_desc(desc, code)));
}

fn gate_error_set(args: &mut ArgBlock) {
    let code = args[1] as u32;
    let text_ptr = args[2] as *const u8;
    let text_len = args[3];
    let msg = if text_ptr.is_null() {
        ""
    } else {
        // Safety: pointer and length describe the caller's string,
        // alive until the trap returns.
        unsafe {
            core::str::from_utf8(core::slice::from_raw_parts(text_ptr, text_len)).unwrap_or("")
        }
    };
    with_fos(|f| {
        let desc = f.current_thread_desc();
        f.error_set(code, desc, msg);
    });
    args[0] = RET_OK;
}

fn gate_file_mount(args: &mut ArgBlock) {
    let dev = args[1] as u8;
    args[0] = ret_word(fwriter::mount(dev));
}

fn gate_file_unmount(args: &mut ArgBlock) {
    let dev = args[1] as u8;
    args[0] = ret_word(fwriter::unmount(dev));
}

fn gate_semb_set_timeout(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let timeout_ms = args[2] as u32;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.semb_set_timeout(desc, timeout_ms, now)));
}

fn gate_semc_take(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.semc_take_current(desc, now)));
}

fn gate_semc_take_stat(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    args[0] = ret_word(with_fos(|f| f.semc_take_stat(desc)));
}

fn gate_semc_give(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.semc_give(desc, now)));
}

fn gate_create_semc(args: &mut ArgBlock) {
    let max_cnt = args[1] as u32;
    let init_cnt = args[2] as u32;
    args[0] = desc_word(with_fos(|f| f.create_semc(max_cnt, init_cnt)));
}

fn gate_delete_semc(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.delete_semc(desc, now)));
}

fn gate_semc_set_timeout(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let timeout_ms = args[2] as u32;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.semc_set_timeout(desc, timeout_ms, now)));
}

fn gate_queue32_create(args: &mut ArgBlock) {
    let size = args[1] as u16;
    let mode = if args[2] == 0 {
        QueueMode::PollOnly
    } else {
        QueueMode::PollAndBlock
    };
    let timeout_ms = args[3] as u32;
    let now = platform::now_ms();
    args[0] = desc_word(with_fos(|f| f.create_queue32(size, mode, timeout_ms, now)));
}

fn gate_queue32_delete(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.delete_queue32(desc, now)));
}

fn gate_queue32_ask(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let blocking = if args[2] == 0 {
        Blocking::Poll
    } else {
        Blocking::Block
    };
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.queue32_ask(desc, blocking, now)));
}

/// Read result comes back in slot 2; slot 0 keeps the status word.
fn gate_queue32_read(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    match with_fos(|f| f.queue32_read(desc)) {
        Ok(data) => {
            args[2] = data as usize;
            args[0] = RET_OK;
        }
        Err(_) => args[0] = RET_FAIL,
    }
}

fn gate_queue32_write(args: &mut ArgBlock) {
    let desc = args[1] as UserDesc;
    let data = args[2] as u32;
    let now = platform::now_ms();
    args[0] = ret_word(with_fos(|f| f.queue32_write(desc, data, now)));
}
