/*
 * Queue32 - circular queue of 32-bit elements
 *
 * The element storage is a block in the thread-memory arena; the control
 * block only keeps the ring indices and the offset. A queue is paired
 * with a counting semaphore that mirrors the number of queued elements,
 * which is what gives `ask_data` its blocking behavior.
 *
 * Reading is a two-step protocol sequenced by the caller:
 *   1. ask_data  - take the paired semaphore (poll or block)
 *   2. read_data - pop the element
 * There is no implicit coupling between the two steps; a consumer that
 * asks and never reads simply leaks one unit of the semaphore.
 */

use crate::config::THREADS_HEAP_SIZE;
use crate::memory::Arena;
use crate::types::{FosError, UserDesc, WRONG_SEM_CNT_ID, WRONG_USER_DESC};

/// Whether blocking asks are allowed at all on this queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    PollOnly,
    PollAndBlock,
}

/// Per-call switch for `ask_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    Poll,
    Block,
}

#[derive(Debug, Clone)]
pub struct Queue32 {
    /// Payload offset of the element buffer in the threads arena.
    buf: u32,
    capacity: u16,
    head: u16,
    tail: u16,
    count: u16,
    pub mode: QueueMode,
    /// Registry index of the paired counting semaphore.
    pub semc_id: u8,
    pub user_desc: UserDesc,
    pub(crate) kmem: u32,
}

impl Queue32 {
    pub fn new(buf: u32, capacity: u16, mode: QueueMode) -> Self {
        Queue32 {
            buf,
            capacity,
            head: 0,
            tail: 0,
            count: 0,
            mode,
            semc_id: WRONG_SEM_CNT_ID,
            user_desc: WRONG_USER_DESC,
            kmem: 0,
        }
    }

    pub fn buf_off(&self) -> u32 {
        self.buf
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn len(&self) -> u16 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Push an element. FAIL when full; the buffer is untouched then and
    /// the paired semaphore must not be given.
    pub fn write(&mut self, arena: &mut Arena<THREADS_HEAP_SIZE>, data: u32) -> Result<(), FosError> {
        if self.count >= self.capacity {
            return Err(FosError::Full);
        }
        arena.write_u32(self.buf + 4 * self.tail as u32, data);
        self.tail = self.wrap(self.tail + 1);
        self.count += 1;
        Ok(())
    }

    /// Pop an element. FAIL when empty; must be preceded by `ask_data`.
    pub fn read(&mut self, arena: &Arena<THREADS_HEAP_SIZE>) -> Result<u32, FosError> {
        if self.count == 0 {
            return Err(FosError::Empty);
        }
        let data = arena.read_u32(self.buf + 4 * self.head as u32);
        self.head = self.wrap(self.head + 1);
        self.count -= 1;
        Ok(data)
    }

    fn wrap(&self, ind: u16) -> u16 {
        if ind >= self.capacity { 0 } else { ind }
    }
}
