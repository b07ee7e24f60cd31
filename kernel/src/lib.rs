/*
 * FOS - a small preemptive real-time kernel
 *
 * This crate implements a priority-based preemptive RTOS kernel for a
 * single-core microcontroller with a dual-stack CPU (separate kernel and
 * user stacks), a pendable software interrupt for context switching and a
 * one-shot slice timer.
 *
 * What the kernel provides:
 * - Threads with fixed priorities, round-robin inside a priority level
 * - Binary and counting semaphores with FIFO wake order and timeouts
 * - Fixed-width 32-bit message queues coupled to counting semaphores
 * - A two-arena allocator (kernel objects / thread memory) with
 *   per-block integrity tags checked periodically
 * - A numbered system-call gateway between user and kernel mode
 * - A deferred-free list so objects are never reclaimed while the
 *   terminating thread still runs on their memory
 * - Registration and periodic servicing of file-writer objects
 *
 * What the kernel does NOT contain:
 * - The context-switch register save/restore and the timer hardware.
 *   Those are the board port's job and are reached through the
 *   `platform::Platform` trait. This keeps the crate architecture-neutral
 *   and lets the whole state machine run under `cargo test` on a host.
 */

#![cfg_attr(not(test), no_std)]

pub mod api;
pub mod config;
pub mod fwriter;
pub mod ipc;
pub mod memory;
pub mod platform;
pub mod run;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod types;

pub use platform::Platform;
pub use scheduler::thread::{AllocMode, ThreadUserInit};
pub use types::{FosError, UserDesc};

/// Kernel version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
