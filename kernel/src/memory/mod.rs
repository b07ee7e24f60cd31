/*
 * Kernel Memory Management
 *
 * Two fixed arenas back every dynamic allocation in the system:
 * - the kernel arena holds control-block allocations for dynamically
 *   created objects (threads, semaphores, queues, writer buffers' slots)
 * - the thread arena holds thread stack/scratch regions and queue buffers
 *
 * Both are served by the same checked free-list allocator.
 */

pub mod heap;

pub use heap::{Arena, ArenaId, DelEntry, KernelHeaps};
