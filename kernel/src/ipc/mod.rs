/*
 * Inter-Thread Messaging
 *
 * Fixed-width message queues. Element type is a bare u32: wide enough
 * for a scalar or an index, narrow enough that producers in interrupt
 * context can post without formatting.
 */

pub mod queue32;

pub use queue32::{Blocking, Queue32, QueueMode};
