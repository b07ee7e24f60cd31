/*
 * Synchronization Primitives
 *
 * The blocker is the shared building block: a FIFO ring of thread
 * indices waiting on one object. Binary and counting semaphores wrap a
 * blocker with their own state and the common timeout machinery.
 *
 * Primitives here are pure state machines. They never touch the thread
 * table themselves; take/give report which thread must be blocked or
 * woken and the kernel core applies the side effect. That keeps the
 * ownership graph index-based instead of pointer-based.
 */

pub mod blocker;
pub mod semaphore;

pub use blocker::Blocker;
pub use semaphore::{LockTimeout, SemBinary, SemCounting, SembState, TakeOutcome};
