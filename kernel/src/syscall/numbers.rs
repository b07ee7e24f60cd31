/*
 * System Call Numbers
 *
 * Every user-mode kernel service is a numbered entry in the call table.
 * The argument block layout is shared by all calls: slot 0 receives the
 * return value, slots 1.. carry the arguments (values, or pointers cast
 * to usize for the two calls that pass structures).
 *
 * 0xFFFF is reserved: it is never dispatched through the table and
 * instead raises a deliberate fault, used to exercise fault handlers.
 */

/// Cooperative yield
pub const SYSCALL_YIELD: u16 = 0x00;
/// Sleep(ms); INF_TIME sleeps until an explicit wake
pub const SYSCALL_SLEEP: u16 = 0x01;

/// Binary semaphore: take / give
pub const SYSCALL_SEMB_TAKE: u16 = 0x02;
pub const SYSCALL_SEMB_GIVE: u16 = 0x03;

/// Thread management
pub const SYSCALL_CREATE_THREAD: u16 = 0x04;
pub const SYSCALL_CREATE_SEMB: u16 = 0x05;
pub const SYSCALL_THREAD_RUN: u16 = 0x06;
pub const SYSCALL_THREAD_TERMINATE: u16 = 0x07;
pub const SYSCALL_THREAD_TERMINATE_DESC: u16 = 0x08;

/// Latch an unrecoverable error
pub const SYSCALL_ERROR_SET: u16 = 0x09;

/// File system mount state
pub const SYSCALL_FILE_MOUNT: u16 = 0x0A;
pub const SYSCALL_FILE_UNMOUNT: u16 = 0x0B;

pub const SYSCALL_DELETE_SEMB: u16 = 0x0C;
/// A thread's private binary semaphore (join support)
pub const SYSCALL_GET_THREAD_SEMB: u16 = 0x0D;
pub const SYSCALL_SEMB_SET_TIMEOUT: u16 = 0x0E;

/// Counting semaphore
pub const SYSCALL_SEMC_TAKE: u16 = 0x0F;
pub const SYSCALL_SEMC_GIVE: u16 = 0x10;
pub const SYSCALL_CREATE_SEMC: u16 = 0x11;
pub const SYSCALL_DELETE_SEMC: u16 = 0x12;
pub const SYSCALL_SEMC_SET_TIMEOUT: u16 = 0x13;

/// 32-bit queues
pub const SYSCALL_QUEUE32_CREATE: u16 = 0x14;
pub const SYSCALL_QUEUE32_DELETE: u16 = 0x15;
pub const SYSCALL_QUEUE32_READ: u16 = 0x16;
pub const SYSCALL_QUEUE32_WRITE: u16 = 0x17;
pub const SYSCALL_QUEUE32_ASK: u16 = 0x18;

/// Timeout status of the most recent wake
pub const SYSCALL_SEMB_TAKE_STAT: u16 = 0x19;
pub const SYSCALL_SEMC_TAKE_STAT: u16 = 0x1A;

/// Reserved id that raises a deliberate fault instead of dispatching.
pub const HARD_FAULT_CALL_ID: u16 = 0xFFFF;
