/*
 * Shared Kernel Types
 *
 * Identifiers, descriptors and the error type used across the kernel.
 *
 * A kernel object is described by an index and a descriptor:
 * - The index (`ThrId` and friends) is the object's slot in its registry
 *   table. Indices are internal; blockers and the scheduler work on them.
 * - The user descriptor (`UserDesc`) is the opaque 32-bit token handed to
 *   user code. Descriptors are generated monotonically and never reuse the
 *   two reserved values.
 */

use crate::config::MAX_STR_ERR_LEN;

/// Internal table index of a thread
pub type ThrId = u8;

/// Sentinel index marking "no thread" in waiter rings and lookups
pub const WRONG_THREAD_ID: ThrId = 0xFF;

/// Sentinel index for a missing binary semaphore
pub const WRONG_SEM_BIN_ID: u8 = 0xFF;

/// Sentinel index for a missing counting semaphore
pub const WRONG_SEM_CNT_ID: u8 = 0xFF;

/// Sentinel index for a missing queue
pub const WRONG_QUE_32_ID: u8 = 0xFF;

/// Sentinel index for a missing writer object
pub const WRONG_FWRITER_ID: u8 = 0xFF;

/// Opaque object token handed to user code
pub type UserDesc = u32;

/// Descriptor value that never names an object
pub const WRONG_USER_DESC: UserDesc = 0;

/// Descriptor reserved for the kernel itself (parent of boot-time threads)
pub const KERNEL_USER_DESC: UserDesc = 1;

/// Infinite time; disables wake-on-time when passed to sleep or timeouts
pub const INF_TIME: u32 = 0xFFFF_FFFF;

/// Why a kernel operation failed.
///
/// Every variant maps to the single FAIL word at the system-call boundary;
/// the distinctions exist for kernel-internal callers and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FosError {
    /// Descriptor does not name a live object
    BadDescriptor,
    /// An argument was out of range or a null/empty input
    InvalidArg,
    /// Arena allocation failed
    OutOfMemory,
    /// A registry or the deferred-free list is full
    NoFreeSlot,
    /// The object is in a state that forbids the operation
    WrongState,
    /// The most recent wake-up was caused by a timeout
    Timeout,
    /// Queue is full
    Full,
    /// Queue is empty
    Empty,
    /// The operation failed on the kernel side of the call gate, which
    /// carries no failure detail back across
    Fail,
}

/// Latched kernel error codes
pub const ERROR_KERNEL_HEAP: u32 = 1;
pub const ERROR_THREADS_HEAP: u32 = 2;
pub const ERROR_THREADS_STACK: u32 = 3;
pub const ERROR_KERNEL_STACK: u32 = 4;

/// The last unrecoverable error, latched for a debugger to find.
#[derive(Debug, Clone, Default)]
pub struct LatchedError {
    pub code: u32,
    pub user_desc: UserDesc,
    pub text: heapless::String<MAX_STR_ERR_LEN>,
}

impl LatchedError {
    pub fn set(&mut self, code: u32, user_desc: UserDesc, text: &str) {
        self.code = code;
        self.user_desc = user_desc;
        self.text = bounded(text);
    }
}

/// Copy a string into a fixed-capacity buffer, truncating at the limit.
pub fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
