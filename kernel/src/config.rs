/*
 * Kernel Configuration
 *
 * Compile-time capacities and sizes for every kernel table and arena.
 * All registries are statically sized; nothing in the kernel grows at
 * runtime beyond what is declared here.
 */

/// Maximum number of threads
pub const MAX_THR_CNT: usize = 32;

/// Maximum number of binary semaphores
pub const SEM_BIN_CNT: usize = 32;

/// Maximum number of counting semaphores
pub const SEM_COUNTING_CNT: usize = 16;

/// Maximum number of 32-bit queues
pub const QUEUE_32_CNT: usize = 16;

/// Maximum number of registered writer objects
pub const FWRITER_CNT: usize = 8;

/// Size of the system-call table
pub const SYS_CALL_CNT: usize = 32;

/// Number of priority levels (0 is the highest)
pub const PRIORITY_CNT: usize = 8;

/// Fixed length of a thread name
pub const THR_NAME_LEN: usize = 16;

/// Maximum length of a latched error description
pub const MAX_STR_ERR_LEN: usize = 32;

/// Capacity of the deferred-free list
pub const MAX_OBJ_TO_DEL: usize = 32;

/// Kernel stack size in bytes (the scheduler runs on this stack)
pub const KERNEL_STACK_SIZE: usize = 0x800;

/// Kernel-object arena size in bytes
pub const KERNEL_HEAP_SIZE: usize = 0x2000;

/// Thread-memory arena size in bytes (stacks and queue buffers)
pub const THREADS_HEAP_SIZE: usize = 0x10000;

/// Default thread stack size for `create_thread_def`
pub const DEF_THR_STACK_SIZE: u32 = 0x400;

/// Default thread scratch-heap size for `create_thread_def`
pub const DEF_THR_HEAP_SIZE: u32 = 0x400;

/// Stack size of the built-in idle thread
pub const IDLE_THR_STACK_SIZE: u32 = 0x200;

/// Stack size of the built-in file-service thread
pub const FPROC_THR_STACK_SIZE: u32 = 0x400;

/// Stack usage (percent) above which the overflow warning fires
pub const ERROR_STACK_WML: f32 = 40.0;

/// How often stacks are probed for their high-water mark, ms
pub const STACK_CHECK_PERIOD_MS: u32 = 1000;

/// How often the arena integrity pass runs, ms
pub const HEAP_CHECK_PERIOD_MS: u32 = 1000;

/// Allowed range of the scheduler slice period, microseconds
pub const MIN_TIM_PERIOD_US: u32 = 100;
pub const MAX_TIM_PERIOD_US: u32 = 10_000;

/// Default scheduler slice period, microseconds
pub const DEF_TIM_PERIOD_US: u32 = 1000;

/// Upper bound for a writer object's buffered-write block
pub const FILEWR_MAX_BUF_LEN: u16 = 2048;
